use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Block a read or query is evaluated against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    #[default]
    Latest,
    Pending,
    Number(u64),
}

impl BlockTag {
    /// Returns the explicit height, if any. Only explicit heights are reproducible.
    pub const fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<u64> for BlockTag {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

impl std::fmt::Display for BlockTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Pending => f.write_str("pending"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// The subset of a block header this layer needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub base_fee_per_gas: Option<u64>,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub timestamp: u64,
}

impl BlockHeader {
    /// Percentage of the gas limit consumed by this block.
    pub fn utilization_pct(&self) -> u64 {
        if self.gas_limit == 0 {
            return 0;
        }
        (self.gas_used as u128 * 100 / self.gas_limit as u128) as u64
    }
}
