use std::time::Duration;

use chainlane_node::NodeError;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("gave up after {attempts} failed polls: {last}")]
    RetriesExhausted { attempts: u32, last: NodeError },
    #[error(transparent)]
    Node(NodeError),
    #[error("no terminal status within {0:?}")]
    Timeout(Duration),
    #[error("watch cancelled")]
    Cancelled,
    #[error("watch task stopped unexpectedly")]
    Stopped,
}
