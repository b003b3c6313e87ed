use std::time::Duration;

use alloy_primitives::Address;
use chainlane_node::NodeError;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("insufficient funds for gas * price + value")]
    InsufficientFunds,
    #[error("nonce too low")]
    NonceTooLow,
    #[error("transaction underpriced")]
    Underpriced,
    #[error("execution reverted{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    SimulationReverted { reason: Option<String> },
    #[error("no signer registered for {0}")]
    MissingSigner(Address),
    #[error("fee quote was computed for a different call or sender")]
    QuoteMismatch,
    #[error("fee quote is stale")]
    StaleQuote,
    #[error("signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    Node(NodeError),
    /// The local wait expired. The transaction may still have reached the node.
    #[error("submission timed out after {0:?}")]
    Timeout(Duration),
}

const NONCE_TOO_LOW: [&str; 3] = ["nonce too low", "already known", "nonce has already been used"];
const UNDERPRICED: [&str; 4] = [
    "underpriced",
    "fee cap less than",
    "max fee per gas less than",
    "fee too low",
];

impl From<NodeError> for SubmissionError {
    fn from(err: NodeError) -> Self {
        if let NodeError::Revert { reason, .. } = err {
            return Self::SimulationReverted { reason };
        }
        if err.is_transient() {
            return Self::Node(err);
        }

        let message = err.message();
        if message.contains("insufficient funds") {
            Self::InsufficientFunds
        } else if NONCE_TOO_LOW.iter().any(|m| message.contains(m)) {
            Self::NonceTooLow
        } else if UNDERPRICED.iter().any(|m| message.contains(m)) {
            Self::Underpriced
        } else {
            Self::Node(err)
        }
    }
}
