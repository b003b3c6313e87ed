#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod address;
pub mod block;
pub mod call;
pub mod contracts;
pub mod error;
pub mod fee;
pub mod log;
pub mod operation;
pub mod receipt;

pub use address::parse_address;
pub use block::{BlockHeader, BlockTag};
pub use call::{CallDescriptor, CallRequest, Selector};
pub use error::EncodingError;
pub use fee::FeeCaps;
pub use log::{ChainLog, EventDelta, EventFilter, LogQuery, TopicFilter};
pub use operation::{OperationKind, OperationStatus, PendingOperation};
pub use receipt::Receipt;

pub use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
