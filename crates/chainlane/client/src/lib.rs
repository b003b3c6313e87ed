#![cfg_attr(not(test), warn(unused_crate_dependencies))]

//! One handle over reads, fee quotes, writes, receipt tracking and events
//! against a single node.

pub mod client;
pub mod config;
pub mod error;

pub use client::InteractionClient;
pub use config::ClientConfig;
pub use error::{ClientError, ErrorKind};

pub use chainlane_events::{EventConfig, Reorg, SubscriptionHandle};
pub use chainlane_fees::{FeeConfig, FeeQuote};
pub use chainlane_read::{BatchMode, ReadConfig};
pub use chainlane_submit::{OperationSigner, SignerRegistry, SubmitConfig};
pub use chainlane_watch::{OperationTracker, WatchConfig};
