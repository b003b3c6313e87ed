#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;

pub use cache::ReadCache;
pub use config::ReadConfig;
pub use error::ReadError;
pub use executor::{BatchMode, BatchOutcome, ReadExecutor};
