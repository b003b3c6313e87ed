use chainlane_node::{NodeError, RetryError};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EventError {
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: NodeError,
    },
    #[error(transparent)]
    Node(NodeError),
}

impl From<RetryError> for EventError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Exhausted {
                operation,
                attempts,
                last,
            } => Self::RetriesExhausted {
                operation,
                attempts,
                last,
            },
            RetryError::Permanent(err) => Self::Node(err),
        }
    }
}
