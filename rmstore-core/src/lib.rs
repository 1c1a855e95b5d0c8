#![allow(clippy::cargo_common_metadata)]

pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod track;

#[cfg(feature = "test-utils")]
pub mod test_utils;
