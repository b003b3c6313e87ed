#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod alloy;
pub mod client;
pub mod error;
pub mod retry;
pub mod timeout;

pub use alloy::AlloyNodeClient;
pub use client::NodeClient;
pub use error::NodeError;
pub use retry::{RetryError, RetryPolicy};
pub use timeout::{with_deadline, with_timeout, Elapsed};
