#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod config;
pub mod error;
pub mod nonce;
pub mod signer;
pub mod submitter;

pub use config::SubmitConfig;
pub use error::SubmissionError;
pub use nonce::{NonceManager, NonceReservation};
pub use signer::{OperationSigner, SignerRegistry};
pub use submitter::{WriteSubmitter, CANCEL_GAS_LIMIT};
