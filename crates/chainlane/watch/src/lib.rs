#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod config;
pub mod error;
pub mod tracker;
pub mod watcher;

pub use config::WatchConfig;
pub use error::WatchError;
pub use tracker::OperationTracker;
pub use watcher::{ReceiptWatcher, WatchState};
