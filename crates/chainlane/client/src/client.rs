use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;
use chainlane_events::{EventError, EventSubscriber, SubscriptionHandle};
use chainlane_fees::{FeeEstimator, FeeQuote};
use chainlane_node::NodeClient;
use chainlane_primitives::{
    BlockTag, CallDescriptor, ChainLog, EventDelta, EventFilter, PendingOperation,
};
use chainlane_read::{BatchMode, ReadError, ReadExecutor};
use chainlane_submit::{SignerRegistry, WriteSubmitter};
use chainlane_watch::{OperationTracker, ReceiptWatcher};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use crate::{config::ClientConfig, error::ClientError};

/// Reads, writes and event tracking against one node.
///
/// All components share the node handle. Cloning is cheap.
#[derive(Debug)]
pub struct InteractionClient<N> {
    node: Arc<N>,
    reads: Arc<ReadExecutor<N>>,
    fees: Arc<FeeEstimator<N>>,
    submitter: Arc<WriteSubmitter<N>>,
    watcher: ReceiptWatcher<N>,
    events: EventSubscriber<N>,
}

impl<N> Clone for InteractionClient<N> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            reads: self.reads.clone(),
            fees: self.fees.clone(),
            submitter: self.submitter.clone(),
            watcher: self.watcher.clone(),
            events: self.events.clone(),
        }
    }
}

impl<N: NodeClient> InteractionClient<N> {
    pub fn new(node: Arc<N>, signers: SignerRegistry, config: ClientConfig) -> Self {
        let ClientConfig {
            read,
            fees,
            submit,
            watch,
            events,
        } = config;
        Self {
            reads: Arc::new(ReadExecutor::new(node.clone(), read)),
            fees: Arc::new(FeeEstimator::new(node.clone(), fees)),
            submitter: Arc::new(WriteSubmitter::new(node.clone(), signers, submit)),
            watcher: ReceiptWatcher::new(node.clone(), watch),
            events: EventSubscriber::new(node.clone(), events),
            node,
        }
    }

    pub fn node(&self) -> &Arc<N> {
        &self.node
    }

    pub fn reads(&self) -> &ReadExecutor<N> {
        &self.reads
    }

    pub fn fees(&self) -> &FeeEstimator<N> {
        &self.fees
    }

    pub fn submitter(&self) -> &WriteSubmitter<N> {
        &self.submitter
    }

    pub fn watcher(&self) -> &ReceiptWatcher<N> {
        &self.watcher
    }

    pub fn events(&self) -> &EventSubscriber<N> {
        &self.events
    }

    pub async fn read(&self, descriptor: &CallDescriptor, block: BlockTag) -> Result<Bytes, ClientError> {
        Ok(self.reads.read(descriptor, block).await?)
    }

    pub async fn read_typed<C: SolCall>(
        &self,
        target: Address,
        call: &C,
        block: BlockTag,
    ) -> Result<C::Return, ClientError> {
        Ok(self.reads.read_typed(target, call, block).await?)
    }

    /// Results in input order. With [`BatchMode::AllOrNothing`] the first
    /// failure fails the whole batch.
    pub async fn batch_read(
        &self,
        descriptors: &[CallDescriptor],
        block: BlockTag,
        mode: BatchMode,
    ) -> Result<Vec<Result<Bytes, ReadError>>, ClientError> {
        Ok(self.reads.batch_read(descriptors, block, mode).await?)
    }

    pub async fn estimate(&self, descriptor: &CallDescriptor, from: Address) -> Result<FeeQuote, ClientError> {
        Ok(self.fees.estimate(descriptor, from).await?)
    }

    pub async fn submit(
        &self,
        descriptor: &CallDescriptor,
        quote: &FeeQuote,
        from: Address,
    ) -> Result<PendingOperation, ClientError> {
        Ok(self.submitter.submit(descriptor, quote, from).await?)
    }

    /// Quotes and submits in one step. A call that fails to estimate is never
    /// broadcast.
    pub async fn send(&self, descriptor: &CallDescriptor, from: Address) -> Result<PendingOperation, ClientError> {
        let quote = self.fees.estimate(descriptor, from).await?;
        debug!(
            target: "chainlane::submit",
            %from,
            gas_limit = quote.gas_limit(),
            max_fee = quote.max_fee(),
            "quoted"
        );
        let op = self.submitter.submit(descriptor, &quote, from).await?;
        info!(target: "chainlane::submit", tx_hash = ?op.tx_hash, nonce = op.nonce, "sent");
        Ok(op)
    }

    pub async fn replace(&self, op: &PendingOperation, quote: &FeeQuote) -> Result<PendingOperation, ClientError> {
        Ok(self.submitter.replace(op, quote).await?)
    }

    pub async fn cancel(&self, op: &PendingOperation, quote: &FeeQuote) -> Result<PendingOperation, ClientError> {
        Ok(self.submitter.cancel(op, quote).await?)
    }

    pub fn watch(&self, op: PendingOperation) -> OperationTracker {
        self.watcher.watch(op)
    }

    pub async fn subscribe<F>(&self, filter: EventFilter, callback: F) -> Result<SubscriptionHandle, ClientError>
    where
        F: FnMut(EventDelta) + Send + 'static,
    {
        Ok(self.events.subscribe(filter, callback).await?)
    }

    pub async fn subscribe_stream(
        &self,
        filter: EventFilter,
    ) -> Result<
        (
            SubscriptionHandle,
            UnboundedReceiverStream<Result<EventDelta, EventError>>,
        ),
        ClientError,
    > {
        Ok(self.events.subscribe_stream(filter).await?)
    }

    pub fn fetch_historical(
        &self,
        filter: EventFilter,
        from: u64,
        to: u64,
    ) -> impl Stream<Item = Result<ChainLog, ClientError>> + Send + 'static {
        self.events
            .fetch_historical(filter, from, to)
            .map(|item| item.map_err(ClientError::from))
    }

    /// Drops cached reads of the filter's contract at every height a
    /// reorganization may have replaced.
    pub async fn invalidate_on_reorg(&self, filter: EventFilter) -> Result<SubscriptionHandle, ClientError> {
        let reads = self.reads.clone();
        let target = filter.address;
        let handle = self
            .events
            .subscribe_reorgs(filter, move |reorg| {
                reads.invalidate_from(target, reorg.common_ancestor + 1);
            })
            .await?;
        Ok(handle)
    }
}
