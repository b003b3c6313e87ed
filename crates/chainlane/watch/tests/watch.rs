use std::{sync::Arc, time::Duration};

use alloy_primitives::U256;
use chainlane_fees::{FeeConfig, FeeEstimator};
use chainlane_node::{NodeError, RetryPolicy};
use chainlane_primitives::{contracts::IERC20, CallDescriptor, OperationStatus, PendingOperation};
use chainlane_submit::{SignerRegistry, SubmitConfig, WriteSubmitter};
use chainlane_test_utils::{account, signer, MockNode, TOKEN};
use chainlane_watch::{ReceiptWatcher, WatchConfig, WatchError};
use tokio::sync::watch;

const DEADLINE: Duration = Duration::from_secs(5);

struct Harness {
    node: Arc<MockNode>,
    fees: FeeEstimator<MockNode>,
    submitter: WriteSubmitter<MockNode>,
}

impl Harness {
    fn new() -> Self {
        let node = Arc::new(MockNode::dev(2));
        Self {
            fees: FeeEstimator::new(node.clone(), FeeConfig::default()),
            submitter: WriteSubmitter::new(
                node.clone(),
                SignerRegistry::new().with(signer(0)),
                SubmitConfig::default(),
            ),
            node,
        }
    }

    async fn transfer(&self, amount: u64) -> eyre::Result<PendingOperation> {
        let call = CallDescriptor::from_call(
            TOKEN,
            &IERC20::transferCall {
                to: account(1),
                amount: U256::from(amount),
            },
        );
        let quote = self.fees.estimate(&call, account(0)).await?;
        Ok(self.submitter.submit(&call, &quote, account(0)).await?)
    }

    fn watcher(&self, config: WatchConfig) -> ReceiptWatcher<MockNode> {
        ReceiptWatcher::new(self.node.clone(), config)
    }
}

fn fast(finality_depth: u64) -> WatchConfig {
    WatchConfig::builder()
        .poll_interval(Duration::from_millis(5))
        .finality_depth(finality_depth)
        .build()
}

async fn reach(
    rx: &mut watch::Receiver<OperationStatus>,
    expected: impl Fn(&OperationStatus) -> bool,
) -> eyre::Result<OperationStatus> {
    let status = tokio::time::timeout(DEADLINE, rx.wait_for(|s| expected(s))).await??;
    Ok(status.clone())
}

#[tokio::test]
async fn operation_progresses_to_finality() -> eyre::Result<()> {
    let h = Harness::new();
    let op = h.transfer(10).await?;
    let tracker = h.watcher(fast(3)).watch(op);
    let mut rx = tracker.subscribe();
    assert_eq!(tracker.status(), OperationStatus::Submitted);

    h.node.mine();
    reach(&mut rx, |s| *s == OperationStatus::Included { block: 1 }).await?;
    for confirmations in 1..=3 {
        h.node.mine();
        reach(&mut rx, |s| {
            *s == OperationStatus::Confirmed {
                block: 1,
                confirmations,
            }
        })
        .await?;
    }
    h.node.mine();
    let status = tracker.wait_with_timeout(DEADLINE).await?;
    let OperationStatus::Finalized { receipt } = &status else {
        eyre::eyre::bail!("expected finalized, got {status}");
    };
    assert_eq!(receipt.block_number, 1);

    // A reorg after finality changes nothing, even one replacing the
    // inclusion block.
    h.node.reorg(5);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(tracker.status(), status);
    assert!(tracker.is_finished());
    Ok(())
}

#[tokio::test]
async fn failed_execution_is_reverted() -> eyre::Result<()> {
    let h = Harness::new();
    // Both quotes succeed against the pending state; only one can execute.
    let first = h.transfer(600).await?;
    let second = h.transfer(600).await?;
    let watcher = h.watcher(fast(12));
    let first = watcher.watch(first);
    let second = watcher.watch(second);

    h.node.mine();
    let status = second.wait_with_timeout(DEADLINE).await?;
    assert!(matches!(status, OperationStatus::Reverted { ref receipt } if !receipt.success));
    assert_eq!(first.wait_with_timeout(Duration::from_millis(50)).await, Err(WatchError::Timeout(Duration::from_millis(50))));
    assert!(matches!(first.status(), OperationStatus::Included { .. }));
    Ok(())
}

#[tokio::test]
async fn reorg_before_finality_regresses() -> eyre::Result<()> {
    let h = Harness::new();
    let op = h.transfer(10).await?;
    let tracker = h.watcher(fast(12)).watch(op);
    let mut rx = tracker.subscribe();

    let original = h.node.mine();
    reach(&mut rx, |s| *s == OperationStatus::Included { block: 1 }).await?;

    h.node.rewind(1, &[]);
    reach(&mut rx, |s| *s == OperationStatus::Submitted).await?;

    let replacement = h.node.mine();
    assert_ne!(original.hash, replacement.hash);
    reach(&mut rx, |s| *s == OperationStatus::Included { block: 1 }).await?;
    assert!(!tracker.is_finished());
    tracker.cancel();
    Ok(())
}

#[tokio::test]
async fn replaced_operations_are_detected() -> eyre::Result<()> {
    let h = Harness::new();
    let op = h.transfer(10).await?;
    let quote = h.fees.estimate(&op.descriptor, account(0)).await?;
    let replacement = h
        .submitter
        .replace(&op, &h.submitter.bump_for_replacement(&op, &quote))
        .await?;

    let watcher = h.watcher(fast(1));
    let original = watcher.watch(op);
    let replacement = watcher.watch(replacement);
    h.node.mine_blocks(3);

    assert_eq!(
        original.wait_with_timeout(DEADLINE).await?,
        OperationStatus::Replaced
    );
    assert!(matches!(
        replacement.wait_with_timeout(DEADLINE).await?,
        OperationStatus::Finalized { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn forgotten_operations_are_dropped() -> eyre::Result<()> {
    let h = Harness::new();
    let op = h.transfer(10).await?;
    assert!(h.node.drop_pending(op.tx_hash));

    let config = WatchConfig::builder()
        .poll_interval(Duration::from_millis(5))
        .drop_timeout(Duration::from_millis(20))
        .build();
    let tracker = h.watcher(config).watch(op);
    assert_eq!(
        tracker.wait_with_timeout(DEADLINE).await?,
        OperationStatus::Dropped
    );
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_surface_an_error() -> eyre::Result<()> {
    let h = Harness::new();
    let op = h.transfer(10).await?;
    h.node.set_offline(true);

    let config = WatchConfig::builder()
        .poll_interval(Duration::from_millis(5))
        .retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2,
        })
        .build();
    let tracker = h.watcher(config).watch(op);

    let err = tracker.wait_with_timeout(DEADLINE).await.unwrap_err();
    assert!(matches!(
        err,
        WatchError::RetriesExhausted {
            attempts: 3,
            last: NodeError::Transport(_)
        }
    ));
    assert_eq!(tracker.status(), OperationStatus::Submitted);
    Ok(())
}

#[tokio::test]
async fn hung_node_exhausts_retries() -> eyre::Result<()> {
    let h = Harness::new();
    let op = h.transfer(10).await?;
    h.node.set_latency(Duration::from_millis(200));

    let config = WatchConfig::builder()
        .poll_interval(Duration::from_millis(5))
        .request_timeout(Duration::from_millis(10))
        .retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2,
        })
        .build();
    let tracker = h.watcher(config).watch(op);

    let (attempts, last) = match tracker.wait_with_timeout(DEADLINE).await {
        Err(WatchError::RetriesExhausted { attempts, last }) => (attempts, last),
        other => eyre::eyre::bail!("expected exhausted retries, got {other:?}"),
    };
    assert_eq!(attempts, 3);
    assert!(last.is_transient());
    assert!(last.to_string().contains("timed out"));
    Ok(())
}

#[tokio::test]
async fn transient_failures_are_retried() -> eyre::Result<()> {
    let h = Harness::new();
    let op = h.transfer(10).await?;
    h.node.mine();
    h.node.fail_next(2, NodeError::Transport("connection reset".into()));

    let config = WatchConfig::builder()
        .poll_interval(Duration::from_millis(5))
        .finality_depth(1)
        .retry(RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2,
        })
        .build();
    let tracker = h.watcher(config).watch(op);
    h.node.mine_blocks(2);

    assert!(matches!(
        tracker.wait_with_timeout(DEADLINE).await?,
        OperationStatus::Finalized { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn cancelled_watches_stop() -> eyre::Result<()> {
    let h = Harness::new();
    let op = h.transfer(10).await?;
    let tracker = h.watcher(fast(12)).watch(op);

    tracker.cancel();
    assert_eq!(
        tracker.wait_with_timeout(DEADLINE).await,
        Err(WatchError::Cancelled)
    );
    Ok(())
}
