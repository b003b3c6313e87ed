use std::time::Duration;

use chainlane_node::NodeError;
use chainlane_primitives::EncodingError;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ReadError {
    /// The call executed and reverted. Retrying against the same block
    /// reverts again.
    #[error("call reverted{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Reverted { reason: Option<String> },
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Node(NodeError),
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
}

impl From<NodeError> for ReadError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::Revert { reason, .. } => Self::Reverted { reason },
            err => Self::Node(err),
        }
    }
}
