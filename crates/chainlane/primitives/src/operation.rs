use alloy_primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{call::CallDescriptor, fee::FeeCaps, receipt::Receipt};

/// Why an operation was broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Submit,
    /// Same nonce and call as `replaces`, with higher fees.
    Replace { replaces: TxHash },
    /// Zero-value self call with the nonce of `cancels`.
    Cancel { cancels: TxHash },
}

/// A broadcast write awaiting its outcome.
#[derive(Clone, Debug)]
pub struct PendingOperation {
    /// For cancellations, the call of the cancelled operation.
    pub descriptor: CallDescriptor,
    pub from: Address,
    pub nonce: u64,
    pub fees: FeeCaps,
    pub tx_hash: TxHash,
    pub submitted_at: DateTime<Utc>,
    pub kind: OperationKind,
}

/// Lifecycle of a pending operation.
///
/// ```text
/// Submitted -> Included -> Confirmed(k) -> Finalized
///     |            |            |
///     |            +------------+--> Reverted
///     +--> Dropped | Replaced
/// ```
///
/// Before finality a reorg may send `Included`/`Confirmed` back to `Submitted`
/// (or straight to a new inclusion). Terminal states never change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationStatus {
    Submitted,
    Included { block: u64 },
    Confirmed { block: u64, confirmations: u64 },
    Finalized { receipt: Receipt },
    Reverted { receipt: Receipt },
    Dropped,
    Replaced,
}

impl OperationStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finalized { .. } | Self::Reverted { .. } | Self::Dropped | Self::Replaced
        )
    }

    /// Number of blocks built on top of the inclusion block, if included.
    pub const fn confirmations(&self) -> Option<u64> {
        match self {
            Self::Included { .. } => Some(0),
            Self::Confirmed { confirmations, .. } => Some(*confirmations),
            _ => None,
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        use OperationStatus::*;

        if self.is_terminal() || self == next {
            return false;
        }
        match (self, next) {
            (Included { .. } | Confirmed { .. }, Dropped | Replaced) => false,
            (Confirmed { block, confirmations }, Confirmed { block: b, confirmations: c })
                if block == b =>
            {
                c > confirmations
            }
            _ => true,
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => f.write_str("submitted"),
            Self::Included { block } => write!(f, "included in block {block}"),
            Self::Confirmed {
                block,
                confirmations,
            } => write!(f, "confirmed({confirmations}) in block {block}"),
            Self::Finalized { receipt } => write!(f, "finalized in block {}", receipt.block_number),
            Self::Reverted { receipt } => write!(f, "reverted in block {}", receipt.block_number),
            Self::Dropped => f.write_str("dropped"),
            Self::Replaced => f.write_str("replaced"),
        }
    }
}
