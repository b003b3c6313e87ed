use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_primitives::{Address, U256};
use chainlane_events::{EventConfig, EventError, EventSubscriber};
use chainlane_fees::{FeeConfig, FeeEstimator};
use chainlane_node::{NodeError, RetryPolicy};
use chainlane_primitives::{
    contracts::IERC20, CallDescriptor, ChainLog, EventDelta, EventFilter,
};
use chainlane_submit::{SignerRegistry, SubmitConfig, WriteSubmitter};
use chainlane_test_utils::{account, signer, MockNode, TOKEN};
use futures::{StreamExt, TryStreamExt};

const DEADLINE: Duration = Duration::from_secs(5);

struct Harness {
    node: Arc<MockNode>,
    fees: FeeEstimator<MockNode>,
    submitter: WriteSubmitter<MockNode>,
}

impl Harness {
    fn new() -> Self {
        let node = Arc::new(MockNode::dev(3));
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

    /// Sends `amount` tokens from account 0 to `to` and mines the block.
    async fn transfer(&self, to: Address, amount: u64) -> eyre::Result<()> {
        let call = CallDescriptor::from_call(
            TOKEN,
            &IERC20::transferCall {
                to,
                amount: U256::from(amount),
            },
        );
        let quote = self.fees.estimate(&call, account(0)).await?;
        self.submitter.submit(&call, &quote, account(0)).await?;
        self.node.mine();
        Ok(())
    }

    fn subscriber(&self, config: EventConfig) -> EventSubscriber<MockNode> {
        EventSubscriber::new(self.node.clone(), config)
    }
}

fn live() -> EventConfig {
    EventConfig::builder()
        .poll_interval(Duration::from_millis(5))
        .build()
}

fn transfers() -> EventFilter {
    EventFilter::for_event::<IERC20::Transfer>(TOKEN)
}

fn amount(log: &ChainLog) -> eyre::Result<U256> {
    Ok(log.decode::<IERC20::Transfer>()?.value)
}

#[tokio::test]
async fn historical_fetch_is_chunked_and_repeatable() -> eyre::Result<()> {
    let h = Harness::new();
    for value in [1, 2, 3] {
        h.transfer(account(1), value).await?;
    }
    h.node.set_max_log_range(2);

    let subscriber = h.subscriber(EventConfig::builder().chunk_size(2).build());
    let first: Vec<ChainLog> = subscriber
        .fetch_historical(transfers(), 0, 3)
        .try_collect()
        .await?;
    assert_eq!(h.node.requests("eth_getLogs"), 2);

    let amounts = first.iter().map(amount).collect::<eyre::Result<Vec<_>>>()?;
    assert_eq!(amounts, vec![U256::from(1), U256::from(2), U256::from(3)]);
    assert!(first.windows(2).all(|pair| pair[0].position() < pair[1].position()));

    let second: Vec<ChainLog> = subscriber
        .fetch_historical(transfers(), 0, 3)
        .try_collect()
        .await?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn historical_fetch_applies_indexed_filters() -> eyre::Result<()> {
    let h = Harness::new();
    h.transfer(account(1), 5).await?;
    h.transfer(account(2), 7).await?;

    let filter = transfers().with_topic2(account(2).into_word());
    let logs: Vec<ChainLog> = h
        .subscriber(EventConfig::default())
        .fetch_historical(filter, 0, h.node.head().number)
        .try_collect()
        .await?;

    assert_eq!(logs.len(), 1);
    let event = logs[0].decode::<IERC20::Transfer>()?;
    assert_eq!(event.to, account(2));
    assert_eq!(event.value, U256::from(7));
    Ok(())
}

#[tokio::test]
async fn empty_and_inverted_ranges_yield_nothing() -> eyre::Result<()> {
    let h = Harness::new();
    h.transfer(account(1), 1).await?;
    let subscriber = h.subscriber(EventConfig::default());

    let inverted: Vec<ChainLog> = subscriber
        .fetch_historical(transfers(), 5, 2)
        .try_collect()
        .await?;
    assert!(inverted.is_empty());
    assert_eq!(h.node.requests("eth_getLogs"), 0);

    let genesis: Vec<ChainLog> = subscriber
        .fetch_historical(transfers(), 0, 0)
        .try_collect()
        .await?;
    assert!(genesis.is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_window_ends_the_stream() -> eyre::Result<()> {
    let h = Harness::new();
    h.transfer(account(1), 1).await?;
    h.node.set_max_log_range(1);

    let results: Vec<_> = h
        .subscriber(EventConfig::builder().chunk_size(10).build())
        .fetch_historical(transfers(), 0, 1)
        .collect()
        .await;
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(EventError::Node(NodeError::Rpc { .. }))));
    Ok(())
}

#[tokio::test]
async fn live_events_arrive_in_order() -> eyre::Result<()> {
    let h = Harness::new();
    h.transfer(account(1), 100).await?;

    let (handle, mut stream) = h.subscriber(live()).subscribe_stream(transfers()).await?;
    for value in [1, 2, 3] {
        h.transfer(account(1), value).await?;
    }

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let delta = tokio::time::timeout(DEADLINE, stream.next()).await?;
        let Some(EventDelta::Added(log)) = delta.transpose()? else {
            eyre::eyre::bail!("expected an added event");
        };
        seen.push(amount(&log)?);
    }
    // The transfer mined before subscribing is not replayed.
    assert_eq!(seen, vec![U256::from(1), U256::from(2), U256::from(3)]);
    handle.cancel();
    Ok(())
}

#[tokio::test]
async fn callbacks_receive_events() -> eyre::Result<()> {
    let h = Harness::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let handle = h
        .subscriber(live())
        .subscribe(transfers(), move |delta| {
            if let Ok(mut received) = sink.lock() {
                received.push(delta);
            }
        })
        .await?;

    h.transfer(account(1), 9).await?;
    tokio::time::timeout(DEADLINE, async {
        while received.lock().map(|r| r.is_empty()).unwrap_or(true) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    handle.cancel();

    let received = received.lock().map_err(|_| eyre::eyre::eyre!("poisoned"))?;
    assert!(matches!(&received[0], EventDelta::Added(log) if log.block_number == 1));
    Ok(())
}

#[tokio::test]
async fn reorged_events_are_retracted_before_replacement() -> eyre::Result<()> {
    let h = Harness::new();
    let (handle, mut stream) = h.subscriber(live()).subscribe_stream(transfers()).await?;

    h.transfer(account(1), 42).await?;
    let original = match tokio::time::timeout(DEADLINE, stream.next()).await? {
        Some(Ok(EventDelta::Added(log))) => log,
        other => eyre::eyre::bail!("expected an added event, got {other:?}"),
    };

    let replacement_head = h.node.reorg(1);
    assert_ne!(replacement_head.hash, original.block_hash);

    let removed = tokio::time::timeout(DEADLINE, stream.next()).await?;
    assert_eq!(removed, Some(Ok(EventDelta::Removed(original.clone()))));

    let replacement = match tokio::time::timeout(DEADLINE, stream.next()).await? {
        Some(Ok(EventDelta::Added(log))) => log,
        other => eyre::eyre::bail!("expected the replacement event, got {other:?}"),
    };
    assert_eq!(replacement.tx_hash, original.tx_hash);
    assert_eq!(replacement.block_hash, replacement_head.hash);
    handle.cancel();
    Ok(())
}

#[tokio::test]
async fn cancelled_subscriptions_stop_delivering() -> eyre::Result<()> {
    let h = Harness::new();
    let (handle, mut stream) = h.subscriber(live()).subscribe_stream(transfers()).await?;

    handle.cancel();
    tokio::time::timeout(DEADLINE, handle.closed()).await??;
    assert!(handle.is_finished());

    h.transfer(account(1), 1).await?;
    assert!(tokio::time::timeout(DEADLINE, stream.next()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_surface_in_the_stream() -> eyre::Result<()> {
    let h = Harness::new();
    let config = EventConfig::builder()
        .poll_interval(Duration::from_millis(5))
        .retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2,
        })
        .build();
    let (handle, mut stream) = h.subscriber(config).subscribe_stream(transfers()).await?;
    h.node.set_offline(true);

    let item = tokio::time::timeout(DEADLINE, stream.next()).await?;
    assert!(matches!(
        item,
        Some(Err(EventError::RetriesExhausted {
            attempts: 3,
            last: NodeError::Transport(_),
            ..
        }))
    ));
    assert!(tokio::time::timeout(DEADLINE, handle.closed()).await?.is_err());
    Ok(())
}

#[tokio::test]
async fn reorgs_report_their_common_ancestor() -> eyre::Result<()> {
    let h = Harness::new();
    let (tx, mut reorgs) = tokio::sync::mpsc::unbounded_channel();
    let handle = h
        .subscriber(live())
        .subscribe_reorgs(transfers(), move |reorg| {
            let _ = tx.send(reorg);
        })
        .await?;

    h.transfer(account(1), 42).await?;
    // Let the subscription deliver block 1 before replacing it.
    tokio::time::timeout(DEADLINE, async {
        while h.node.requests("eth_getLogs") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.node.reorg(1);
    let Some(reorg) = tokio::time::timeout(DEADLINE, reorgs.recv()).await? else {
        eyre::eyre::bail!("reorg callback dropped");
    };
    assert_eq!(reorg.common_ancestor, 0);
    assert_eq!(reorg.removed.len(), 1);
    assert_eq!(reorg.removed[0].block_number, 1);
    assert_eq!(amount(&reorg.removed[0])?, U256::from(42));
    handle.cancel();
    Ok(())
}

#[tokio::test]
async fn callback_subscriptions_report_why_they_ended() -> eyre::Result<()> {
    let h = Harness::new();
    let config = EventConfig::builder()
        .poll_interval(Duration::from_millis(5))
        .retry(RetryPolicy {
            max_retries: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2,
        })
        .build();
    let handle = h.subscriber(config).subscribe(transfers(), |_| {}).await?;
    h.node.set_offline(true);

    let closed = tokio::time::timeout(DEADLINE, handle.closed()).await?;
    assert!(matches!(
        closed,
        Err(EventError::RetriesExhausted {
            attempts: 2,
            last: NodeError::Transport(_),
            ..
        })
    ));
    assert!(handle.is_finished());
    Ok(())
}

#[tokio::test]
async fn hung_node_exhausts_poll_retries() -> eyre::Result<()> {
    let h = Harness::new();
    let config = EventConfig::builder()
        .poll_interval(Duration::from_millis(5))
        .request_timeout(Duration::from_millis(10))
        .retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2,
        })
        .build();
    let (handle, mut stream) = h.subscriber(config).subscribe_stream(transfers()).await?;
    h.node.set_latency(Duration::from_millis(200));

    let (attempts, last) = match tokio::time::timeout(DEADLINE, stream.next()).await? {
        Some(Err(EventError::RetriesExhausted { attempts, last, .. })) => (attempts, last),
        other => eyre::eyre::bail!("expected exhausted retries, got {other:?}"),
    };
    assert_eq!(attempts, 3);
    assert!(last.is_transient());
    assert!(last.to_string().contains("timed out"));
    assert!(tokio::time::timeout(DEADLINE, handle.closed()).await?.is_err());
    Ok(())
}

#[tokio::test]
async fn hung_node_ends_historical_fetch() -> eyre::Result<()> {
    let h = Harness::new();
    h.transfer(account(1), 1).await?;
    h.node.set_latency(Duration::from_millis(200));

    let config = EventConfig::builder()
        .request_timeout(Duration::from_millis(10))
        .retry(RetryPolicy::no_retry())
        .build();
    let results: Vec<_> = tokio::time::timeout(
        DEADLINE,
        h.subscriber(config).fetch_historical(transfers(), 0, 1).collect::<Vec<_>>(),
    )
    .await?;
    assert_eq!(results.len(), 1);
    assert!(matches!(
        &results[0],
        Err(EventError::RetriesExhausted { attempts: 1, .. })
    ));
    Ok(())
}
