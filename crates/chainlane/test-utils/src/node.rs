//! An in-memory chain implementing [`NodeClient`].
//!
//! Transactions are accepted into a pool and included when a test calls
//! [`MockNode::mine`]. Every block keeps a snapshot of the world state after it,
//! so reads at historical heights and reorganizations are exact.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use alloy_consensus::{transaction::SignerRecoverable, Transaction, TxEnvelope};
use alloy_eips::{
    eip1559::{calc_next_block_base_fee, BaseFeeParams},
    eip2718::Decodable2718,
};
use alloy_primitives::{keccak256, Address, Bytes, LogData, TxHash, TxKind, B256, U256};
use async_trait::async_trait;
use chainlane_node::{NodeClient, NodeError};
use chainlane_primitives::{BlockHeader, BlockTag, CallRequest, ChainLog, LogQuery, Receipt};
use parking_lot::Mutex;

use crate::{
    contract::{Execution, MockContract, MockErc20, BASE_GAS},
    utils::account,
    DEV_CHAIN_ID, GWEI, TOKEN,
};

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_TIME: u64 = 12;
const GAS_LIMIT: u64 = 30_000_000;
const ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);
/// Minimum fee bump, in percent, for a pool replacement.
const REPLACEMENT_BUMP_PCT: u128 = 10;

/// Balances, nonces and contract storage.
#[derive(Clone, Debug, Default)]
pub struct WorldState {
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, U256>,
    storage: HashMap<Address, HashMap<B256, U256>>,
}

impl WorldState {
    pub fn nonce(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.balances.insert(address, balance);
    }

    pub fn storage(&self, address: Address, slot: B256) -> U256 {
        self.storage
            .get(&address)
            .and_then(|slots| slots.get(&slot))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_storage(&mut self, address: Address, slot: B256, value: U256) {
        self.storage.entry(address).or_default().insert(slot, value);
    }
}

#[derive(Clone, Debug)]
struct PoolTx {
    hash: TxHash,
    from: Address,
    nonce: u64,
    to: TxKind,
    input: Bytes,
    value: U256,
    gas_limit: u64,
    max_fee: u128,
    max_priority_fee: u128,
}

#[derive(Clone, Debug)]
struct MockBlock {
    header: BlockHeader,
    transactions: Vec<PoolTx>,
    receipts: Vec<Receipt>,
    /// State after this block.
    state: WorldState,
}

#[derive(Debug)]
struct ChainState {
    chain_id: u64,
    blocks: Vec<MockBlock>,
    pool: BTreeMap<(Address, u64), PoolTx>,
    contracts: HashMap<Address, Arc<dyn MockContract>>,
    priority_fee: u128,
    /// Bumped on every reorg so replacement blocks hash differently.
    fork: u64,
    max_log_range: Option<u64>,
    offline: bool,
    failures: Option<(usize, NodeError)>,
    requests: HashMap<&'static str, usize>,
    latency: Option<Duration>,
    mine_before: Option<&'static str>,
}

/// In-memory node for tests.
#[derive(Debug)]
pub struct MockNode {
    state: Mutex<ChainState>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new(DEV_CHAIN_ID)
    }
}

fn block_hash(number: u64, parent: B256, fork: u64, transactions: &[PoolTx]) -> B256 {
    let mut preimage = Vec::with_capacity(48 + transactions.len() * 32);
    preimage.extend_from_slice(&number.to_be_bytes());
    preimage.extend_from_slice(parent.as_slice());
    preimage.extend_from_slice(&fork.to_be_bytes());
    for tx in transactions {
        preimage.extend_from_slice(tx.hash.as_slice());
    }
    keccak256(preimage)
}

fn rejected(message: &str) -> NodeError {
    NodeError::Rpc {
        code: -32000,
        message: message.to_string(),
    }
}

impl MockNode {
    /// An empty chain holding only a genesis block with a 1 gwei base fee.
    pub fn new(chain_id: u64) -> Self {
        let genesis = BlockHeader {
            number: 0,
            hash: block_hash(0, B256::ZERO, 0, &[]),
            parent_hash: B256::ZERO,
            base_fee_per_gas: Some(GWEI as u64),
            gas_used: 0,
            gas_limit: GAS_LIMIT,
            timestamp: GENESIS_TIMESTAMP,
        };
        Self {
            state: Mutex::new(ChainState {
                chain_id,
                blocks: vec![MockBlock {
                    header: genesis,
                    transactions: Vec::new(),
                    receipts: Vec::new(),
                    state: WorldState::default(),
                }],
                pool: BTreeMap::new(),
                contracts: HashMap::new(),
                priority_fee: GWEI,
                fork: 0,
                max_log_range: None,
                offline: false,
                failures: None,
                requests: HashMap::new(),
                latency: None,
                mine_before: None,
            }),
        }
    }

    /// A chain with `accounts` funded with 100 ether each and [`MockErc20`]
    /// deployed at [`TOKEN`], with 1000 tokens minted to account 0.
    pub fn dev(accounts: u32) -> Self {
        let node = Self::default();
        for index in 0..accounts {
            node.set_balance(account(index), U256::from(100u64) * ETHER);
        }
        node.deploy(TOKEN, MockErc20);
        node.mint(TOKEN, account(0), U256::from(1_000u64));
        node
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.with_head_state(|state| state.set_balance(address, balance));
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.state.lock().head().state.balance(address)
    }

    pub fn deploy(&self, address: Address, contract: impl MockContract + 'static) {
        self.state.lock().contracts.insert(address, Arc::new(contract));
    }

    pub fn mint(&self, token: Address, holder: Address, amount: U256) {
        self.with_head_state(|state| MockErc20::mint(state, token, holder, amount));
    }

    pub fn token_balance(&self, token: Address, holder: Address) -> U256 {
        MockErc20::balance_of(&self.state.lock().head().state, token, holder)
    }

    pub fn set_base_fee(&self, base_fee: u64) {
        self.state.lock().head_mut().header.base_fee_per_gas = Some(base_fee);
    }

    /// Overrides the head block's gas usage, as a share of its limit.
    pub fn set_head_utilization(&self, pct: u64) {
        let mut state = self.state.lock();
        let header = &mut state.head_mut().header;
        header.gas_used = header.gas_limit / 100 * pct;
    }

    pub fn set_priority_fee(&self, priority_fee: u128) {
        self.state.lock().priority_fee = priority_fee;
    }

    /// Rejects log queries spanning more than `range` blocks.
    pub fn set_max_log_range(&self, range: u64) {
        self.state.lock().max_log_range = Some(range);
    }

    /// Fails the next `count` requests with `err`.
    pub fn fail_next(&self, count: usize, err: NodeError) {
        self.state.lock().failures = Some((count, err));
    }

    /// While offline every request fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Delays every request by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Mines a block right before serving the next `method` request, as if it
    /// landed between two calls of the client.
    pub fn mine_before_next(&self, method: &'static str) {
        self.state.lock().mine_before = Some(method);
    }

    /// Number of requests served for `method`, e.g. `"eth_call"`.
    pub fn requests(&self, method: &str) -> usize {
        self.state.lock().requests.get(method).copied().unwrap_or_default()
    }

    pub fn head(&self) -> BlockHeader {
        self.state.lock().head().header.clone()
    }

    pub fn pool_size(&self) -> usize {
        self.state.lock().pool.len()
    }

    /// Removes a transaction from the pool without including it.
    pub fn drop_pending(&self, hash: TxHash) -> bool {
        let mut state = self.state.lock();
        let key = state
            .pool
            .iter()
            .find(|(_, tx)| tx.hash == hash)
            .map(|(key, _)| *key);
        key.and_then(|key| state.pool.remove(&key)).is_some()
    }

    /// Mines one block and returns its header.
    pub fn mine(&self) -> BlockHeader {
        self.state.lock().mine()
    }

    pub fn mine_blocks(&self, count: u64) -> BlockHeader {
        let mut state = self.state.lock();
        for _ in 1..count {
            state.mine();
        }
        state.mine()
    }

    /// Removes the last `depth` blocks and returns their transactions to the
    /// pool, except those listed in `dropping`.
    pub fn rewind(&self, depth: u64, dropping: &[TxHash]) {
        self.state.lock().rewind(depth, dropping);
    }

    /// Replaces the last `depth` blocks with `depth` new ones re-including the
    /// same transactions.
    pub fn reorg(&self, depth: u64) -> BlockHeader {
        let mut state = self.state.lock();
        state.rewind(depth, &[]);
        for _ in 1..depth {
            state.mine();
        }
        state.mine()
    }

    fn with_head_state(&self, f: impl FnOnce(&mut WorldState)) {
        f(&mut self.state.lock().head_mut().state)
    }

    async fn begin(&self, method: &'static str) -> Result<(), NodeError> {
        let latency = {
            let mut state = self.state.lock();
            *state.requests.entry(method).or_default() += 1;
            if state.offline {
                return Err(NodeError::Transport("connection refused".into()));
            }
            if let Some((remaining, err)) = state.failures.take() {
                if remaining > 1 {
                    state.failures = Some((remaining - 1, err.clone()));
                }
                if remaining > 0 {
                    return Err(err);
                }
            }
            if state.mine_before == Some(method) {
                state.mine_before = None;
                state.mine();
            }
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

impl ChainState {
    fn head(&self) -> &MockBlock {
        // The genesis block is never removed.
        &self.blocks[self.blocks.len() - 1]
    }

    fn head_mut(&mut self) -> &mut MockBlock {
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }

    fn block(&self, tag: BlockTag) -> Result<&MockBlock, NodeError> {
        match tag {
            BlockTag::Latest | BlockTag::Pending => Ok(self.head()),
            BlockTag::Number(n) => self
                .blocks
                .get(n as usize)
                .ok_or_else(|| rejected("header not found")),
        }
    }

    fn next_base_fee(&self) -> u64 {
        let parent = &self.head().header;
        calc_next_block_base_fee(
            parent.gas_used,
            parent.gas_limit,
            parent.base_fee_per_gas.unwrap_or_default(),
            BaseFeeParams::ethereum(),
        )
    }

    fn pending_nonce(&self, address: Address) -> u64 {
        let mut nonce = self.head().state.nonce(address);
        while self.pool.contains_key(&(address, nonce)) {
            nonce += 1;
        }
        nonce
    }

    fn execute(
        &self,
        state: &mut WorldState,
        from: Address,
        to: TxKind,
        input: &Bytes,
        value: U256,
    ) -> Result<Execution, Bytes> {
        let TxKind::Call(to) = to else {
            return Ok(Execution {
                gas_used: BASE_GAS,
                ..Default::default()
            });
        };
        let balance = state.balance(from);
        if balance < value {
            return Err(Bytes::new());
        }
        state.set_balance(from, balance - value);
        state.set_balance(to, state.balance(to) + value);

        match self.contracts.get(&to) {
            Some(contract) => contract.call(state, from, to, input, value),
            None => Ok(Execution {
                gas_used: BASE_GAS,
                ..Default::default()
            }),
        }
    }

    fn simulate(&self, request: &CallRequest, tag: BlockTag) -> Result<Execution, NodeError> {
        let mut state = self.block(tag)?.state.clone();
        let from = request.from.unwrap_or_default();
        self.execute(
            &mut state,
            from,
            TxKind::Call(request.to),
            &request.input,
            request.value,
        )
        .map_err(NodeError::revert)
    }

    fn mine(&mut self) -> BlockHeader {
        let base_fee = self.next_base_fee();
        let parent = self.head().header.clone();
        let mut world = self.head().state.clone();

        let senders: BTreeSet<Address> = self.pool.keys().map(|(sender, _)| *sender).collect();
        let mut included = Vec::new();
        let mut outcomes = Vec::new();
        let mut gas_used = 0u64;

        for sender in senders {
            loop {
                let key = (sender, world.nonce(sender));
                let Some(tx) = self.pool.get(&key) else { break };
                if tx.max_fee < base_fee as u128 {
                    break;
                }
                let Some(tx) = self.pool.remove(&key) else { break };

                let price = tx
                    .max_fee
                    .min(base_fee as u128 + tx.max_priority_fee);
                let mut scratch = world.clone();
                scratch.nonces.insert(sender, tx.nonce + 1);
                let (success, gas, logs) =
                    match self.execute(&mut scratch, sender, tx.to, &tx.input, tx.value) {
                        Ok(execution) => {
                            world = scratch;
                            (true, execution.gas_used, execution.logs)
                        }
                        Err(_) => {
                            world.nonces.insert(sender, tx.nonce + 1);
                            (false, BASE_GAS, Vec::new())
                        }
                    };
                let gas = gas.min(tx.gas_limit);
                let fee = U256::from(gas as u128 * price);
                world.set_balance(sender, world.balance(sender).saturating_sub(fee));
                gas_used += gas;

                let target = match tx.to {
                    TxKind::Call(to) => to,
                    TxKind::Create => Address::ZERO,
                };
                outcomes.push((tx.hash, success, gas, price, target, logs));
                included.push(tx);
            }
        }

        let number = parent.number + 1;
        let hash = block_hash(number, parent.hash, self.fork, &included);
        let mut log_index = 0u64;
        let receipts = outcomes
            .into_iter()
            .map(|(tx_hash, success, gas_used, price, target, logs)| Receipt {
                tx_hash,
                success,
                block_number: number,
                block_hash: hash,
                gas_used,
                effective_gas_price: price,
                logs: logs
                    .into_iter()
                    .map(|data: LogData| {
                        let log = ChainLog {
                            address: target,
                            topics: data.topics().to_vec(),
                            data: data.data,
                            block_number: number,
                            block_hash: hash,
                            tx_hash,
                            log_index,
                        };
                        log_index += 1;
                        log
                    })
                    .collect(),
            })
            .collect();

        let header = BlockHeader {
            number,
            hash,
            parent_hash: parent.hash,
            base_fee_per_gas: Some(base_fee),
            gas_used,
            gas_limit: parent.gas_limit,
            timestamp: parent.timestamp + BLOCK_TIME,
        };
        self.blocks.push(MockBlock {
            header: header.clone(),
            transactions: included,
            receipts,
            state: world,
        });
        header
    }

    fn rewind(&mut self, depth: u64, dropping: &[TxHash]) {
        let keep = self.blocks.len().saturating_sub(depth as usize).max(1);
        for block in self.blocks.split_off(keep) {
            for tx in block.transactions {
                if !dropping.contains(&tx.hash) {
                    self.pool.insert((tx.from, tx.nonce), tx);
                }
            }
        }
        self.fork += 1;
    }

    fn receipt(&self, hash: TxHash) -> Option<&Receipt> {
        self.blocks
            .iter()
            .flat_map(|block| &block.receipts)
            .find(|receipt| receipt.tx_hash == hash)
    }

    fn admit(&mut self, raw: &[u8]) -> Result<TxHash, NodeError> {
        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| rejected(&format!("failed to decode signed transaction: {e}")))?;
        let from = envelope
            .recover_signer()
            .map_err(|_| rejected("invalid sender"))?;
        if envelope.chain_id().is_some_and(|id| id != self.chain_id) {
            return Err(rejected("invalid chain id"));
        }

        let tx = PoolTx {
            hash: *envelope.tx_hash(),
            from,
            nonce: envelope.nonce(),
            to: envelope.kind(),
            input: envelope.input().clone(),
            value: envelope.value(),
            gas_limit: envelope.gas_limit(),
            max_fee: envelope.max_fee_per_gas(),
            max_priority_fee: envelope
                .max_priority_fee_per_gas()
                .unwrap_or_else(|| envelope.max_fee_per_gas()),
        };

        let state = &self.head().state;
        if tx.nonce < state.nonce(from) {
            return Err(rejected("nonce too low"));
        }
        if let Some(existing) = self.pool.get(&(from, tx.nonce)) {
            if existing.hash == tx.hash {
                return Ok(tx.hash);
            }
            let bumped = |old: u128| old + old * REPLACEMENT_BUMP_PCT / 100;
            if tx.max_fee < bumped(existing.max_fee)
                || tx.max_priority_fee < bumped(existing.max_priority_fee)
            {
                return Err(rejected("replacement transaction underpriced"));
            }
        }
        if tx.max_fee < self.next_base_fee() as u128 {
            return Err(rejected("max fee per gas less than block base fee"));
        }
        let cost = U256::from(tx.gas_limit as u128 * tx.max_fee) + tx.value;
        if cost > state.balance(from) {
            return Err(rejected("insufficient funds for gas * price + value"));
        }

        let hash = tx.hash;
        self.pool.insert((from, tx.nonce), tx);
        Ok(hash)
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn chain_id(&self) -> Result<u64, NodeError> {
        self.begin("eth_chainId").await?;
        Ok(self.state.lock().chain_id)
    }

    async fn block_number(&self) -> Result<u64, NodeError> {
        self.begin("eth_blockNumber").await?;
        Ok(self.state.lock().head().header.number)
    }

    async fn block_header(&self, block: BlockTag) -> Result<Option<BlockHeader>, NodeError> {
        self.begin("eth_getBlockByNumber").await?;
        let state = self.state.lock();
        Ok(state.block(block).ok().map(|block| block.header.clone()))
    }

    async fn call(&self, request: &CallRequest, block: BlockTag) -> Result<Bytes, NodeError> {
        self.begin("eth_call").await?;
        let state = self.state.lock();
        state.simulate(request, block).map(|execution| execution.output)
    }

    async fn estimate_gas(&self, request: &CallRequest, block: BlockTag) -> Result<u64, NodeError> {
        self.begin("eth_estimateGas").await?;
        let state = self.state.lock();
        state.simulate(request, block).map(|execution| execution.gas_used)
    }

    async fn max_priority_fee_per_gas(&self) -> Result<u128, NodeError> {
        self.begin("eth_maxPriorityFeePerGas").await?;
        Ok(self.state.lock().priority_fee)
    }

    async fn transaction_count(&self, address: Address, block: BlockTag) -> Result<u64, NodeError> {
        self.begin("eth_getTransactionCount").await?;
        let state = self.state.lock();
        match block {
            BlockTag::Pending => Ok(state.pending_nonce(address)),
            tag => Ok(state.block(tag)?.state.nonce(address)),
        }
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, NodeError> {
        self.begin("eth_sendRawTransaction").await?;
        self.state.lock().admit(&raw)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<Receipt>, NodeError> {
        self.begin("eth_getTransactionReceipt").await?;
        Ok(self.state.lock().receipt(hash).cloned())
    }

    async fn transaction_known(&self, hash: TxHash) -> Result<bool, NodeError> {
        self.begin("eth_getTransactionByHash").await?;
        let state = self.state.lock();
        Ok(state.pool.values().any(|tx| tx.hash == hash) || state.receipt(hash).is_some())
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>, NodeError> {
        self.begin("eth_getLogs").await?;
        let state = self.state.lock();
        if query.from_block > query.to_block {
            return Err(rejected("invalid block range"));
        }
        if let Some(range) = state.max_log_range {
            if query.to_block - query.from_block + 1 > range {
                return Err(rejected("query exceeds max block range"));
            }
        }
        Ok(state
            .blocks
            .iter()
            .filter(|block| (query.from_block..=query.to_block).contains(&block.header.number))
            .flat_map(|block| &block.receipts)
            .filter(|receipt| receipt.success)
            .flat_map(|receipt| &receipt.logs)
            .filter(|log| query.matches(log))
            .cloned()
            .collect())
    }
}
