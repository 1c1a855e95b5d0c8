/// Library store tests
///
/// - Inserting, re-tagging and deduplicating tracks
/// - Removal and the orphan sweep
/// - Read queries and their ordering
/// - Play statistics
/// - Track origins and store persistence
/// - The worker thread and its events

mod insert_tests;
mod restore_tests;
