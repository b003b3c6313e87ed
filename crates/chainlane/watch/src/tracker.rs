use std::time::Duration;

use chainlane_node::with_timeout;
use chainlane_primitives::{OperationStatus, PendingOperation, TxHash};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;

type Outcome = Option<Result<OperationStatus, WatchError>>;

/// Handle on an operation being watched.
///
/// Status updates come from the watcher task only; the tracker observes them.
/// Dropping the tracker does not stop the task, [`cancel`](Self::cancel) does.
#[derive(Debug, Clone)]
pub struct OperationTracker {
    operation: PendingOperation,
    status: watch::Receiver<OperationStatus>,
    outcome: watch::Receiver<Outcome>,
    cancel: CancellationToken,
}

impl OperationTracker {
    pub(crate) const fn new(
        operation: PendingOperation,
        status: watch::Receiver<OperationStatus>,
        outcome: watch::Receiver<Outcome>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            operation,
            status,
            outcome,
            cancel,
        }
    }

    pub const fn operation(&self) -> &PendingOperation {
        &self.operation
    }

    pub const fn tx_hash(&self) -> TxHash {
        self.operation.tx_hash
    }

    /// Latest observed status.
    pub fn status(&self) -> OperationStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<OperationStatus> {
        self.status.clone()
    }

    /// Whether the watcher task has ended.
    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Waits for a terminal status, or the error that ended the watch.
    pub async fn wait(&self) -> Result<OperationStatus, WatchError> {
        let mut outcome = self.outcome.clone();
        let res = outcome.wait_for(Option::is_some).await;
        match res {
            Ok(outcome) => outcome.clone().unwrap_or(Err(WatchError::Stopped)),
            Err(_) => Err(WatchError::Stopped),
        }
    }

    pub async fn wait_with_timeout(&self, timeout: Duration) -> Result<OperationStatus, WatchError> {
        with_timeout(timeout, self.wait())
            .await
            .map_err(|_| WatchError::Timeout(timeout))?
    }

    /// Stops polling. The on-chain transaction is unaffected.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
