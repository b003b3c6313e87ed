use std::time::Duration;

use chainlane_node::NodeError;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EstimationError {
    /// The call reverts when simulated against the pending block.
    #[error("simulation reverted{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    SimulationReverted { reason: Option<String> },
    #[error("latest block has no base fee")]
    MissingBaseFee,
    #[error(transparent)]
    Node(NodeError),
    #[error("fee estimation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<NodeError> for EstimationError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::Revert { reason, .. } => Self::SimulationReverted { reason },
            err => Self::Node(err),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FeeConfigError {
    #[error("gas margin of {0} bps is outside 1000..=2500")]
    MarginOutOfRange(u32),
    #[error("base fee multiplier must be at least 1")]
    ZeroMultiplier,
}
