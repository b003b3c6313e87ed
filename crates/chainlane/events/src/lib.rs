#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod config;
pub mod cursor;
pub mod error;
pub mod subscriber;

pub use config::EventConfig;
pub use cursor::Cursor;
pub use error::EventError;
pub use subscriber::{EventSubscriber, Reorg, SubscriptionHandle};
