use alloy_primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use chainlane_primitives::{BlockHeader, BlockTag, CallRequest, ChainLog, LogQuery, Receipt};

use crate::error::NodeError;

/// The subset of an execution-layer node's JSON-RPC surface this layer consumes.
///
/// Implementations are black boxes: [`AlloyNodeClient`](crate::AlloyNodeClient)
/// talks to a real endpoint, the test utilities provide an in-memory chain.
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    /// `eth_chainId`
    async fn chain_id(&self) -> Result<u64, NodeError>;

    /// `eth_blockNumber`
    async fn block_number(&self) -> Result<u64, NodeError>;

    /// `eth_getBlockByNumber` without transaction bodies.
    async fn block_header(&self, block: BlockTag) -> Result<Option<BlockHeader>, NodeError>;

    /// `eth_call`
    async fn call(&self, request: &CallRequest, block: BlockTag) -> Result<Bytes, NodeError>;

    /// Several `eth_call`s against the same block, one result per request.
    ///
    /// The default issues the calls one after another; clients that support
    /// JSON-RPC batching override it.
    async fn call_many(
        &self,
        requests: &[CallRequest],
        block: BlockTag,
    ) -> Result<Vec<Result<Bytes, NodeError>>, NodeError> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.call(request, block).await);
        }
        Ok(results)
    }

    /// `eth_estimateGas`
    async fn estimate_gas(&self, request: &CallRequest, block: BlockTag) -> Result<u64, NodeError>;

    /// `eth_maxPriorityFeePerGas`
    async fn max_priority_fee_per_gas(&self) -> Result<u128, NodeError>;

    /// `eth_getTransactionCount`
    async fn transaction_count(&self, address: Address, block: BlockTag) -> Result<u64, NodeError>;

    /// `eth_sendRawTransaction`
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, NodeError>;

    /// `eth_getTransactionReceipt`
    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<Receipt>, NodeError>;

    /// Whether the node still knows the transaction, pending or mined
    /// (`eth_getTransactionByHash`).
    async fn transaction_known(&self, hash: TxHash) -> Result<bool, NodeError>;

    /// `eth_getLogs`
    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>, NodeError>;
}
