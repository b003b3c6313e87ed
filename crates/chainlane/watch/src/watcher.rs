use std::{sync::Arc, time::Instant};

use chainlane_node::{with_deadline, NodeClient, NodeError};
use chainlane_primitives::{BlockTag, OperationStatus, PendingOperation, Receipt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{config::WatchConfig, error::WatchError, tracker::OperationTracker};

/// Everything the watcher knows about one operation between polls.
#[derive(Debug, Clone)]
pub struct WatchState {
    pub operation: PendingOperation,
    pub status: OperationStatus,
    /// Since when the node has not known the transaction.
    pub unknown_since: Option<Instant>,
}

impl WatchState {
    pub const fn new(operation: PendingOperation) -> Self {
        Self {
            operation,
            status: OperationStatus::Submitted,
            unknown_since: None,
        }
    }
}

/// Tracks broadcast operations to a terminal status.
#[derive(Debug)]
pub struct ReceiptWatcher<N> {
    node: Arc<N>,
    config: WatchConfig,
}

impl<N> Clone for ReceiptWatcher<N> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            config: self.config.clone(),
        }
    }
}

impl<N: NodeClient> ReceiptWatcher<N> {
    pub fn new(node: Arc<N>, config: WatchConfig) -> Self {
        Self { node, config }
    }

    pub const fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Starts tracking `operation` on a background task.
    pub fn watch(&self, operation: PendingOperation) -> OperationTracker {
        let (status_tx, status_rx) = watch::channel(OperationStatus::Submitted);
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let watcher = self.clone();
        let state = WatchState::new(operation.clone());
        let token = cancel.clone();
        tokio::spawn(async move {
            let outcome = watcher.run(state, status_tx, token).await;
            outcome_tx.send_replace(Some(outcome));
        });

        OperationTracker::new(operation, status_rx, outcome_rx, cancel)
    }

    async fn run(
        &self,
        mut state: WatchState,
        status: watch::Sender<OperationStatus>,
        cancel: CancellationToken,
    ) -> Result<OperationStatus, WatchError> {
        let tx_hash = state.operation.tx_hash;
        let retry = self.config.retry;
        let mut failures = 0u32;

        loop {
            let delay = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WatchError::Cancelled),
                res = with_deadline(self.config.request_timeout, self.poll(&mut state)) => match res {
                    Ok(changed) => {
                        failures = 0;
                        if let Some(next) = changed {
                            status.send_replace(next.clone());
                            if next.is_terminal() {
                                return Ok(next);
                            }
                        }
                        self.config.poll_interval
                    }
                    Err(err) if !err.is_transient() => return Err(WatchError::Node(err)),
                    Err(err) if failures >= retry.max_retries => {
                        return Err(WatchError::RetriesExhausted {
                            attempts: failures + 1,
                            last: err,
                        })
                    }
                    Err(err) => {
                        let delay = retry.delay_for(failures);
                        failures += 1;
                        warn!(
                            target: "chainlane::watch",
                            ?tx_hash,
                            failures,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "poll failed, backing off"
                        );
                        delay
                    }
                },
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WatchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Evaluates one polling step and returns the new status if it changed.
    pub async fn poll(&self, state: &mut WatchState) -> Result<Option<OperationStatus>, NodeError> {
        let op = &state.operation;
        let next = match self.node.transaction_receipt(op.tx_hash).await? {
            Some(receipt) => {
                state.unknown_since = None;
                self.receipt_status(receipt).await?
            }
            None if matches!(
                state.status,
                OperationStatus::Included { .. } | OperationStatus::Confirmed { .. }
            ) =>
            {
                warn!(
                    target: "chainlane::watch",
                    tx_hash = ?op.tx_hash,
                    status = %state.status,
                    "receipt disappeared, inclusion reorganized away"
                );
                OperationStatus::Submitted
            }
            None => {
                let mined_nonce = self
                    .node
                    .transaction_count(op.from, BlockTag::Latest)
                    .await?;
                if mined_nonce > op.nonce {
                    // The nonce may have been used by this very transaction,
                    // mined after the receipt lookup.
                    match self.node.transaction_receipt(op.tx_hash).await? {
                        Some(receipt) => {
                            debug!(target: "chainlane::watch", tx_hash = ?op.tx_hash, "mined while polling");
                            state.unknown_since = None;
                            self.receipt_status(receipt).await?
                        }
                        None => OperationStatus::Replaced,
                    }
                } else if self.node.transaction_known(op.tx_hash).await? {
                    state.unknown_since = None;
                    return Ok(None);
                } else {
                    let since = *state.unknown_since.get_or_insert_with(Instant::now);
                    if since.elapsed() < self.config.drop_timeout {
                        debug!(target: "chainlane::watch", tx_hash = ?op.tx_hash, "transaction unknown to node");
                        return Ok(None);
                    }
                    OperationStatus::Dropped
                }
            }
        };

        if !state.status.can_transition_to(&next) {
            return Ok(None);
        }
        info!(
            target: "chainlane::watch",
            tx_hash = ?state.operation.tx_hash,
            from = %state.status,
            to = %next,
            "status changed"
        );
        state.status = next.clone();
        Ok(Some(next))
    }

    /// Status implied by a receipt at the current head. An operation is final
    /// once more than `finality_depth` blocks sit on top of its block.
    async fn receipt_status(&self, receipt: Receipt) -> Result<OperationStatus, NodeError> {
        if !receipt.success {
            return Ok(OperationStatus::Reverted { receipt });
        }
        let head = self.node.block_number().await?;
        let block = receipt.block_number;
        let confirmations = head.saturating_sub(block);
        Ok(if confirmations > self.config.finality_depth {
            OperationStatus::Finalized { receipt }
        } else if confirmations == 0 {
            OperationStatus::Included { block }
        } else {
            OperationStatus::Confirmed {
                block,
                confirmations,
            }
        })
    }
}
