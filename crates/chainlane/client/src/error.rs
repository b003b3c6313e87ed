use std::fmt;

use chainlane_events::EventError;
use chainlane_fees::EstimationError;
use chainlane_node::NodeError;
use chainlane_primitives::EncodingError;
use chainlane_read::ReadError;
use chainlane_submit::SubmissionError;
use chainlane_watch::WatchError;

/// Failure category, independent of the component that reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed call. Rejected before any network traffic.
    Encoding,
    /// The call fails on chain.
    SimulationReverted,
    /// The node could not produce a fee quote.
    Estimation,
    InsufficientFunds,
    NonceTooLow,
    Underpriced,
    /// A local deadline expired.
    Timeout,
    /// Receipt or event tracking gave up.
    Watch,
    Node,
    Signer,
    /// The fee quote does not fit the submission.
    Quote,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Encoding => "encoding",
            Self::SimulationReverted => "simulation_reverted",
            Self::Estimation => "estimation",
            Self::InsufficientFunds => "insufficient_funds",
            Self::NonceTooLow => "nonce_too_low",
            Self::Underpriced => "underpriced",
            Self::Timeout => "timeout",
            Self::Watch => "watch",
            Self::Node => "node",
            Self::Signer => "signer",
            Self::Quote => "quote",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClientError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Events(#[from] EventError),
    #[error(transparent)]
    Node(#[from] NodeError),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::Read(err) => match err {
                ReadError::Reverted { .. } => ErrorKind::SimulationReverted,
                ReadError::Encoding(_) => ErrorKind::Encoding,
                ReadError::Node(_) => ErrorKind::Node,
                ReadError::Timeout(_) => ErrorKind::Timeout,
            },
            Self::Estimation(err) => match err {
                EstimationError::SimulationReverted { .. } => ErrorKind::SimulationReverted,
                EstimationError::Timeout(_) => ErrorKind::Timeout,
                EstimationError::MissingBaseFee | EstimationError::Node(_) => ErrorKind::Estimation,
            },
            Self::Submission(err) => match err {
                SubmissionError::InsufficientFunds => ErrorKind::InsufficientFunds,
                SubmissionError::NonceTooLow => ErrorKind::NonceTooLow,
                SubmissionError::Underpriced => ErrorKind::Underpriced,
                SubmissionError::SimulationReverted { .. } => ErrorKind::SimulationReverted,
                SubmissionError::MissingSigner(_) | SubmissionError::Signing(_) => ErrorKind::Signer,
                SubmissionError::QuoteMismatch | SubmissionError::StaleQuote => ErrorKind::Quote,
                SubmissionError::Node(_) => ErrorKind::Node,
                SubmissionError::Timeout(_) => ErrorKind::Timeout,
            },
            Self::Watch(WatchError::Timeout(_)) => ErrorKind::Timeout,
            Self::Watch(_) => ErrorKind::Watch,
            Self::Events(EventError::RetriesExhausted { .. }) => ErrorKind::Watch,
            Self::Events(EventError::Node(_)) | Self::Node(_) => ErrorKind::Node,
        }
    }

    /// Whether trying again, possibly with a fresh quote, can succeed.
    ///
    /// Encoding failures and reverts are deterministic for the current state
    /// and never retryable.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            ErrorKind::Timeout | ErrorKind::NonceTooLow | ErrorKind::Underpriced | ErrorKind::Quote => {
                true
            }
            ErrorKind::Node | ErrorKind::Estimation => {
                self.node_error().is_some_and(NodeError::is_transient)
            }
            _ => false,
        }
    }

    /// The node error underneath, if any.
    pub fn node_error(&self) -> Option<&NodeError> {
        match self {
            Self::Read(ReadError::Node(err))
            | Self::Estimation(EstimationError::Node(err))
            | Self::Submission(SubmissionError::Node(err))
            | Self::Watch(WatchError::Node(err) | WatchError::RetriesExhausted { last: err, .. })
            | Self::Events(EventError::Node(err) | EventError::RetriesExhausted { last: err, .. })
            | Self::Node(err) => Some(err),
            _ => None,
        }
    }
}
