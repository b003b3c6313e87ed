use std::sync::Arc;

use alloy_primitives::B256;
use chainlane_node::{with_deadline, NodeClient, NodeError};
use chainlane_primitives::{BlockTag, ChainLog, EventDelta, EventFilter};
use futures::{stream, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::{config::EventConfig, cursor::Cursor, error::EventError};

type Done = Option<Result<(), EventError>>;

/// A chain reorganization seen by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reorg {
    /// Highest remembered block that is still canonical. Every block above it
    /// may have been replaced.
    pub common_ancestor: u64,
    /// Matching logs the reorganization retracted, most recent first.
    pub removed: Vec<ChainLog>,
}

/// What a poll round hands to a sink.
#[derive(Debug, Clone)]
enum Notice {
    Reorg(Reorg),
    Delta(EventDelta),
}

/// Handle on a live subscription.
///
/// Dropping the handle leaves the subscription running.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    cancel: CancellationToken,
    done: watch::Receiver<Done>,
}

impl SubscriptionHandle {
    /// Stops delivery. Notifications already delivered stay delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Waits for the subscription to end, returning the error that ended it.
    pub async fn closed(&self) -> Result<(), EventError> {
        let mut done = self.done.clone();
        let res = done.wait_for(Option::is_some).await;
        match res {
            Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
            Err(_) => Ok(()),
        }
    }
}

/// Delivers contract events, historical and live.
#[derive(Debug)]
pub struct EventSubscriber<N> {
    node: Arc<N>,
    config: EventConfig,
}

impl<N> Clone for EventSubscriber<N> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            config: self.config.clone(),
        }
    }
}

/// Logs matching `filter` in `[from, to]`, sorted by position.
async fn fetch_window<N: NodeClient + ?Sized>(
    node: &N,
    filter: &EventFilter,
    from: u64,
    to: u64,
) -> Result<Vec<ChainLog>, NodeError> {
    let mut logs = node.logs(&filter.query(from, to)).await?;
    logs.retain(|log| filter.matches(log));
    logs.sort();
    logs.dedup();
    trace!(target: "chainlane::events", from, to, count = logs.len(), "fetched logs");
    Ok(logs)
}

impl<N: NodeClient> EventSubscriber<N> {
    pub fn new(node: Arc<N>, config: EventConfig) -> Self {
        Self { node, config }
    }

    pub const fn config(&self) -> &EventConfig {
        &self.config
    }

    /// Matching logs emitted in blocks `from..=to`, in `(block, log_index)`
    /// order.
    ///
    /// The stream is lazy: each `chunk_size` window is queried when the
    /// previous one has been consumed. A window that cannot be fetched ends
    /// the stream with an error.
    pub fn fetch_historical(
        &self,
        filter: EventFilter,
        from: u64,
        to: u64,
    ) -> impl Stream<Item = Result<ChainLog, EventError>> + Send + 'static {
        let node = self.node.clone();
        let retry = self.config.retry;
        let timeout = self.config.request_timeout;
        let chunk = self.config.chunk_size.max(1);

        stream::unfold(Some(from), move |cursor| {
            let node = node.clone();
            let filter = filter.clone();
            async move {
                let start = cursor?;
                if start > to {
                    return None;
                }
                let end = to.min(start.saturating_add(chunk - 1));
                let next = (end < to).then(|| end + 1);

                match retry
                    .retry("eth_getLogs", || {
                        with_deadline(timeout, fetch_window(&*node, &filter, start, end))
                    })
                    .await
                {
                    Ok(logs) => Some((logs.into_iter().map(Ok).collect::<Vec<_>>(), next)),
                    Err(err) => Some((vec![Err(EventError::from(err))], None)),
                }
            }
        })
        .flat_map(stream::iter)
    }

    /// Delivers matching events from blocks after the current head to
    /// `callback`.
    ///
    /// The callback only sees events. An error ends the subscription; it is
    /// logged at `error` level and returned by [`SubscriptionHandle::closed`].
    pub async fn subscribe<F>(
        &self,
        filter: EventFilter,
        mut callback: F,
    ) -> Result<SubscriptionHandle, EventError>
    where
        F: FnMut(EventDelta) + Send + 'static,
    {
        self.spawn(filter, move |item| {
            if let Ok(Notice::Delta(delta)) = item {
                callback(delta);
            }
            true
        })
        .await
    }

    /// Calls `callback` for every reorganization below the subscription's
    /// events, before the retracted events are redelivered.
    ///
    /// Errors end the subscription the same way as for
    /// [`subscribe`](Self::subscribe).
    pub async fn subscribe_reorgs<F>(
        &self,
        filter: EventFilter,
        mut callback: F,
    ) -> Result<SubscriptionHandle, EventError>
    where
        F: FnMut(Reorg) + Send + 'static,
    {
        self.spawn(filter, move |item| {
            if let Ok(Notice::Reorg(reorg)) = item {
                callback(reorg);
            }
            true
        })
        .await
    }

    /// Like [`subscribe`](Self::subscribe), delivering into a stream. The
    /// subscription ends when the stream is dropped.
    pub async fn subscribe_stream(
        &self,
        filter: EventFilter,
    ) -> Result<
        (
            SubscriptionHandle,
            UnboundedReceiverStream<Result<EventDelta, EventError>>,
        ),
        EventError,
    > {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self
            .spawn(filter, move |item| match item {
                Ok(Notice::Delta(delta)) => tx.send(Ok(delta)).is_ok(),
                Ok(Notice::Reorg(_)) => !tx.is_closed(),
                Err(err) => tx.send(Err(err)).is_ok(),
            })
            .await?;
        Ok((handle, UnboundedReceiverStream::new(rx)))
    }

    async fn spawn<S>(&self, filter: EventFilter, mut sink: S) -> Result<SubscriptionHandle, EventError>
    where
        S: FnMut(Result<Notice, EventError>) -> bool + Send + 'static,
    {
        let timeout = self.config.request_timeout;
        let head = self
            .config
            .retry
            .retry("eth_getBlockByNumber", || {
                with_deadline(timeout, self.node.block_header(BlockTag::Latest))
            })
            .await?
            .ok_or_else(|| EventError::Node(NodeError::Decode("latest block not found".into())))?;
        let cursor = Cursor::new(head.number, head.hash);
        debug!(
            target: "chainlane::events",
            address = %filter.address,
            signature = ?filter.signature,
            from_block = head.number + 1,
            "subscription started"
        );

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        let this = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let outcome = this.run(&filter, cursor, &mut sink, &token).await;
            if let Err(err) = &outcome {
                error!(target: "chainlane::events", address = %filter.address, %err, "subscription failed");
                if !token.is_cancelled() {
                    sink(Err(err.clone()));
                }
            }
            done_tx.send_replace(Some(outcome));
        });

        Ok(SubscriptionHandle {
            cancel,
            done: done_rx,
        })
    }

    async fn run<S>(
        &self,
        filter: &EventFilter,
        mut cursor: Cursor,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), EventError>
    where
        S: FnMut(Result<Notice, EventError>) -> bool,
    {
        let timeout = self.config.request_timeout;
        loop {
            let (notices, next) = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                round = self.config.retry.retry("event poll", || {
                    with_deadline(timeout, self.round(filter, cursor.clone()))
                }) => round?,
            };
            cursor = next;

            for notice in notices {
                if cancel.is_cancelled() || !sink(Ok(notice)) {
                    return Ok(());
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// One poll: reconcile reorgs, then fetch logs up to the new head.
    ///
    /// Works on a copy of the cursor so a failed round can be retried from
    /// the same position.
    async fn round(
        &self,
        filter: &EventFilter,
        mut cursor: Cursor,
    ) -> Result<(Vec<Notice>, Cursor), NodeError> {
        let mut notices = Vec::new();

        if let Some((height, hash)) = cursor.newest() {
            if !self.still_canonical(height, hash).await? {
                let remembered = cursor.remembered();
                let mut rewind_to = remembered
                    .last()
                    .map(|(lowest, _)| lowest.saturating_sub(1))
                    .unwrap_or_default();
                for (height, hash) in remembered.into_iter().skip(1) {
                    if self.still_canonical(height, hash).await? {
                        rewind_to = height;
                        break;
                    }
                }
                let removed = cursor.rewind(rewind_to);
                warn!(
                    target: "chainlane::events",
                    address = %filter.address,
                    rewind_to,
                    removed = removed.len(),
                    "reorg detected"
                );
                notices.push(Notice::Reorg(Reorg {
                    common_ancestor: rewind_to,
                    removed: removed.iter().map(|delta| delta.log().clone()).collect(),
                }));
                notices.extend(removed.into_iter().map(Notice::Delta));
            }
        }

        let Some(head) = self.node.block_header(BlockTag::Latest).await? else {
            return Ok((notices, cursor));
        };
        if head.number > cursor.last_processed() {
            let mut logs = Vec::new();
            let chunk = self.config.chunk_size.max(1);
            let mut start = cursor.last_processed() + 1;
            while start <= head.number {
                let end = head.number.min(start.saturating_add(chunk - 1));
                logs.extend(fetch_window(&*self.node, filter, start, end).await?);
                start = end + 1;
            }
            notices.extend(logs.iter().cloned().map(|log| Notice::Delta(EventDelta::Added(log))));
            cursor.advance(head.number, head.hash, &logs);
        }
        cursor.prune(head.number, self.config.reorg_window);

        Ok((notices, cursor))
    }

    async fn still_canonical(
        &self,
        height: u64,
        hash: B256,
    ) -> Result<bool, NodeError> {
        let header = self.node.block_header(BlockTag::Number(height)).await?;
        Ok(header.is_some_and(|header| header.hash == hash))
    }
}
