use alloy_primitives::{TxHash, B256};
use serde::{Deserialize, Serialize};

use crate::log::ChainLog;

/// Outcome of an included transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: u64,
    pub block_hash: B256,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub logs: Vec<ChainLog>,
}
