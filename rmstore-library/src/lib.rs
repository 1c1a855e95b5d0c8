// Music library store
pub mod changes;
pub mod database;
pub mod identity;
pub mod queries;
pub mod schema;
pub mod statistics;
pub mod worker;
pub mod writer;

pub use changes::{ChangeTracker, Entity};
pub use database::{Database, StoreOptions};
pub use identity::{DuplicateQuery, MatchLevel, NameTable};
pub use worker::{LibraryHandle, LibraryWorker};
