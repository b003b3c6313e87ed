#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod config;
pub mod error;
pub mod estimator;
pub mod math;
pub mod quote;

pub use config::FeeConfig;
pub use error::{EstimationError, FeeConfigError};
pub use estimator::FeeEstimator;
pub use quote::FeeQuote;
