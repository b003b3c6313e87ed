use alloy_consensus::TxReceipt as _;
use alloy_network::ReceiptResponse as _;
use alloy_primitives::{Address, Bytes, TxHash, TxKind};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_client::{BatchRequest, RpcClient};
use alloy_rpc_types_eth::{
    BlockId, BlockNumberOrTag, Filter, Log, TransactionInput, TransactionReceipt,
    TransactionRequest,
};
use alloy_transport_http::Http;
use async_trait::async_trait;
use chainlane_primitives::{BlockHeader, BlockTag, CallRequest, ChainLog, LogQuery, Receipt};
use tracing::{debug, trace};

use crate::{client::NodeClient, error::NodeError};

/// Upper bound on calls per JSON-RPC batch.
const JSON_RPC_BATCH_SIZE: usize = 256;

/// [`NodeClient`] backed by an alloy [`Provider`].
#[derive(Debug, Clone)]
pub struct AlloyNodeClient<P = RootProvider> {
    provider: P,
}

impl AlloyNodeClient<RootProvider> {
    /// Connects to a JSON-RPC endpoint over HTTP.
    pub fn http(rpc_url: &str) -> Result<Self, NodeError> {
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| NodeError::Transport(format!("invalid rpc url `{rpc_url}`: {e}")))?;
        let http = Http::with_client(reqwest::Client::new(), url);
        let client = RpcClient::new(http, false);
        Ok(Self::new(RootProvider::new(client)))
    }
}

impl<P> AlloyNodeClient<P> {
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }
}

fn block_number_or_tag(block: BlockTag) -> BlockNumberOrTag {
    match block {
        BlockTag::Latest => BlockNumberOrTag::Latest,
        BlockTag::Pending => BlockNumberOrTag::Pending,
        BlockTag::Number(n) => BlockNumberOrTag::Number(n),
    }
}

fn block_id(block: BlockTag) -> BlockId {
    BlockId::Number(block_number_or_tag(block))
}

fn transaction_request(request: &CallRequest) -> TransactionRequest {
    TransactionRequest {
        from: request.from,
        to: Some(TxKind::Call(request.to)),
        value: Some(request.value),
        input: TransactionInput::new(request.input.clone()),
        ..Default::default()
    }
}

fn chain_log(log: &Log) -> Result<ChainLog, NodeError> {
    let missing = |field: &str| NodeError::Decode(format!("log without {field}"));
    Ok(ChainLog {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        block_number: log.block_number.ok_or_else(|| missing("block number"))?,
        block_hash: log.block_hash.ok_or_else(|| missing("block hash"))?,
        tx_hash: log.transaction_hash.ok_or_else(|| missing("transaction hash"))?,
        log_index: log.log_index.ok_or_else(|| missing("log index"))?,
    })
}

fn to_receipt(receipt: &TransactionReceipt) -> Result<Receipt, NodeError> {
    let missing = |field: &str| NodeError::Decode(format!("receipt without {field}"));
    Ok(Receipt {
        tx_hash: receipt.transaction_hash,
        success: receipt.status(),
        block_number: receipt.block_number.ok_or_else(|| missing("block number"))?,
        block_hash: receipt.block_hash.ok_or_else(|| missing("block hash"))?,
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
        logs: receipt
            .inner
            .logs()
            .iter()
            .map(chain_log)
            .collect::<Result<_, _>>()?,
    })
}

#[async_trait]
impl<P> NodeClient for AlloyNodeClient<P>
where
    P: Provider + 'static,
{
    async fn chain_id(&self) -> Result<u64, NodeError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn block_number(&self) -> Result<u64, NodeError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_header(&self, block: BlockTag) -> Result<Option<BlockHeader>, NodeError> {
        let Some(block) = self
            .provider
            .get_block_by_number(block_number_or_tag(block))
            .await?
        else {
            return Ok(None);
        };

        let header = &block.header;
        Ok(Some(BlockHeader {
            number: header.number,
            hash: header.hash,
            parent_hash: header.parent_hash,
            base_fee_per_gas: header.base_fee_per_gas,
            gas_used: header.gas_used,
            gas_limit: header.gas_limit,
            timestamp: header.timestamp,
        }))
    }

    async fn call(&self, request: &CallRequest, block: BlockTag) -> Result<Bytes, NodeError> {
        trace!(target: "chainlane::node", to = %request.to, %block, "eth_call");
        Ok(self
            .provider
            .call(transaction_request(request))
            .block(block_id(block))
            .await?)
    }

    async fn call_many(
        &self,
        requests: &[CallRequest],
        block: BlockTag,
    ) -> Result<Vec<Result<Bytes, NodeError>>, NodeError> {
        let mut results = Vec::with_capacity(requests.len());

        for (chunk_idx, chunk) in requests.chunks(JSON_RPC_BATCH_SIZE).enumerate() {
            let mut batch = BatchRequest::new(self.provider.client());
            let mut waiters = Vec::with_capacity(chunk.len());
            for request in chunk {
                let params = (transaction_request(request), block_id(block));
                let waiter = batch.add_call::<_, Bytes>("eth_call", &params)?;
                waiters.push(waiter);
            }

            debug!(
                target: "chainlane::node",
                chunk_index = chunk_idx,
                chunk_size = chunk.len(),
                "sending eth_call batch"
            );
            batch.send().await?;

            for waiter in waiters {
                results.push(waiter.await.map_err(NodeError::from));
            }
        }

        Ok(results)
    }

    async fn estimate_gas(&self, request: &CallRequest, block: BlockTag) -> Result<u64, NodeError> {
        Ok(self
            .provider
            .estimate_gas(transaction_request(request))
            .block(block_id(block))
            .await?)
    }

    async fn max_priority_fee_per_gas(&self) -> Result<u128, NodeError> {
        Ok(self.provider.get_max_priority_fee_per_gas().await?)
    }

    async fn transaction_count(&self, address: Address, block: BlockTag) -> Result<u64, NodeError> {
        Ok(self
            .provider
            .get_transaction_count(address)
            .block_id(block_id(block))
            .await?)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, NodeError> {
        let pending = self.provider.send_raw_transaction(&raw).await?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<Receipt>, NodeError> {
        self.provider
            .get_transaction_receipt(hash)
            .await?
            .as_ref()
            .map(to_receipt)
            .transpose()
    }

    async fn transaction_known(&self, hash: TxHash) -> Result<bool, NodeError> {
        Ok(self
            .provider
            .get_transaction_by_hash(hash)
            .await?
            .is_some())
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>, NodeError> {
        let mut filter = Filter::new()
            .address(query.address)
            .from_block(query.from_block)
            .to_block(query.to_block);
        for (slot, topics) in query.topics.iter().enumerate() {
            if let Some(values) = topics {
                filter.topics[slot] = values.clone().into();
            }
        }

        self.provider
            .get_logs(&filter)
            .await?
            .iter()
            .map(chain_log)
            .collect()
    }
}
