use std::{future::Future, time::Duration};

pub use tokio::time::error::Elapsed;

use crate::error::NodeError;

/// Runs `fut` to completion or until `duration` passes.
///
/// Dropping the future on expiry cancels only the local wait; a request that
/// already reached the node may still take effect.
pub async fn with_timeout<F: Future>(duration: Duration, fut: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(duration, fut).await
}

/// Runs a node request with a deadline. Expiry is reported as a transport
/// failure, so retry policies treat a hung node like an unreachable one.
pub async fn with_deadline<T, F>(duration: Duration, fut: F) -> Result<T, NodeError>
where
    F: Future<Output = Result<T, NodeError>>,
{
    with_timeout(duration, fut)
        .await
        .map_err(|_| NodeError::Transport(format!("request timed out after {duration:?}")))?
}
