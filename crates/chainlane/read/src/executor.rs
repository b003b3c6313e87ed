use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;
use chainlane_node::{with_timeout, NodeClient};
use chainlane_primitives::{BlockTag, CallDescriptor, EncodingError};
use tracing::{debug, trace};

use crate::{cache::ReadCache, config::ReadConfig, error::ReadError};

/// How a batch reports individual failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// Every descriptor gets its own result.
    #[default]
    AllowPartialFailure,
    /// The batch fails with the first failing descriptor, in input order.
    AllOrNothing,
}

/// One result per descriptor in input order, or the failure that aborted the
/// whole batch.
pub type BatchOutcome = Result<Vec<Result<Bytes, ReadError>>, ReadError>;

/// Executes side-effect-free contract calls.
#[derive(Debug)]
pub struct ReadExecutor<N> {
    node: Arc<N>,
    config: ReadConfig,
    cache: ReadCache,
}

impl<N: NodeClient> ReadExecutor<N> {
    pub fn new(node: Arc<N>, config: ReadConfig) -> Self {
        let cache = ReadCache::new(config.cache_capacity);
        Self {
            node,
            config,
            cache,
        }
    }

    pub const fn config(&self) -> &ReadConfig {
        &self.config
    }

    pub const fn cache(&self) -> &ReadCache {
        &self.cache
    }

    /// Executes `descriptor` against `block` with the configured deadline.
    pub async fn read(&self, descriptor: &CallDescriptor, block: BlockTag) -> Result<Bytes, ReadError> {
        self.read_with_timeout(descriptor, block, self.config.timeout)
            .await
    }

    pub async fn read_with_timeout(
        &self,
        descriptor: &CallDescriptor,
        block: BlockTag,
        timeout: Duration,
    ) -> Result<Bytes, ReadError> {
        let digest = descriptor.digest();
        if let Some(height) = block.as_number() {
            if let Some(hit) = self.cache.get(digest, height) {
                trace!(target: "chainlane::read", contract = %descriptor.target(), height, "cache hit");
                return Ok(hit);
            }
        }

        let request = descriptor.to_request(None);
        let output = with_timeout(timeout, self.node.call(&request, block))
            .await
            .map_err(|_| ReadError::Timeout(timeout))??;

        if let Some(height) = block.as_number() {
            self.cache
                .insert(digest, height, descriptor.target(), output.clone());
        }
        Ok(output)
    }

    /// Reads a typed `sol!` call and decodes its return value.
    pub async fn read_typed<C: SolCall>(
        &self,
        target: Address,
        call: &C,
        block: BlockTag,
    ) -> Result<C::Return, ReadError> {
        let descriptor = CallDescriptor::from_call(target, call);
        let output = self.read(&descriptor, block).await?;
        C::abi_decode_returns(&output)
            .map_err(|e| EncodingError::ReturnDecode(e.to_string()).into())
    }

    /// Executes every descriptor against the same block.
    ///
    /// Uncached calls go to the node as a single batch.
    pub async fn batch_read(
        &self,
        descriptors: &[CallDescriptor],
        block: BlockTag,
        mode: BatchMode,
    ) -> BatchOutcome {
        let height = block.as_number();
        let mut results: Vec<Option<Result<Bytes, ReadError>>> = descriptors
            .iter()
            .map(|descriptor| {
                height
                    .and_then(|h| self.cache.get(descriptor.digest(), h))
                    .map(Ok)
            })
            .collect();

        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(i, result)| result.is_none().then_some(i))
            .collect();

        if !missing.is_empty() {
            let requests: Vec<_> = missing
                .iter()
                .map(|&i| descriptors[i].to_request(None))
                .collect();
            debug!(
                target: "chainlane::read",
                total = descriptors.len(),
                uncached = requests.len(),
                %block,
                "batch read"
            );

            let timeout = self.config.timeout;
            let outputs = with_timeout(timeout, self.node.call_many(&requests, block))
                .await
                .map_err(|_| ReadError::Timeout(timeout))??;
            if outputs.len() != requests.len() {
                return Err(ReadError::Node(chainlane_node::NodeError::Decode(format!(
                    "batch returned {} results for {} calls",
                    outputs.len(),
                    requests.len()
                ))));
            }

            for (i, output) in missing.into_iter().zip(outputs) {
                if let (Some(h), Ok(bytes)) = (height, &output) {
                    let descriptor = &descriptors[i];
                    self.cache
                        .insert(descriptor.digest(), h, descriptor.target(), bytes.clone());
                }
                results[i] = Some(output.map_err(ReadError::from));
            }
        }

        let results: Vec<Result<Bytes, ReadError>> = results.into_iter().flatten().collect();
        match mode {
            BatchMode::AllowPartialFailure => Ok(results),
            BatchMode::AllOrNothing => {
                if let Some(Err(err)) = results.iter().find(|result| result.is_err()) {
                    return Err(err.clone());
                }
                Ok(results)
            }
        }
    }

    /// Forgets cached reads of `target` at heights `>= height`.
    pub fn invalidate_from(&self, target: Address, height: u64) -> usize {
        let removed = self.cache.invalidate_from(target, height);
        if removed > 0 {
            debug!(target: "chainlane::read", contract = %target, height, removed, "invalidated cached reads");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use chainlane_node::NodeError;
    use chainlane_primitives::contracts::IERC20;
    use chainlane_test_utils::{account, MockNode, TOKEN};
    use test_case::test_case;

    fn executor(node: &Arc<MockNode>) -> ReadExecutor<MockNode> {
        ReadExecutor::new(node.clone(), ReadConfig::default())
    }

    fn balance_of(holder: Address) -> CallDescriptor {
        CallDescriptor::from_call(TOKEN, &IERC20::balanceOfCall { account: holder })
    }

    fn transfer(amount: u64) -> CallDescriptor {
        CallDescriptor::from_call(
            TOKEN,
            &IERC20::transferCall {
                to: account(1),
                amount: U256::from(amount),
            },
        )
    }

    #[tokio::test]
    async fn historical_reads_are_cached() -> eyre::Result<()> {
        let node = Arc::new(MockNode::dev(2));
        node.mine();
        let reader = executor(&node);

        let first = reader.read(&balance_of(account(0)), BlockTag::Number(1)).await?;
        node.mint(TOKEN, account(0), U256::from(5));
        let second = reader.read(&balance_of(account(0)), BlockTag::Number(1)).await?;

        assert_eq!(first, second);
        assert_eq!(node.requests("eth_call"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn latest_reads_bypass_the_cache() -> eyre::Result<()> {
        let node = Arc::new(MockNode::dev(2));
        let reader = executor(&node);

        reader.read(&balance_of(account(0)), BlockTag::Latest).await?;
        reader.read(&balance_of(account(0)), BlockTag::Latest).await?;

        assert_eq!(node.requests("eth_call"), 2);
        assert!(reader.cache().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn typed_reads_decode_returns() -> eyre::Result<()> {
        let node = Arc::new(MockNode::dev(2));
        let reader = executor(&node);

        let balance = reader
            .read_typed(
                TOKEN,
                &IERC20::balanceOfCall {
                    account: account(0),
                },
                BlockTag::Latest,
            )
            .await?;
        assert_eq!(balance, U256::from(1_000));

        let decimals = reader
            .read_typed(TOKEN, &IERC20::decimalsCall {}, BlockTag::Latest)
            .await?;
        assert_eq!(decimals, 18);
        Ok(())
    }

    #[tokio::test]
    async fn reverts_carry_the_reason() {
        let node = Arc::new(MockNode::dev(2));
        let reader = executor(&node);

        let err = reader
            .read(&transfer(1_000_000), BlockTag::Latest)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ReadError::Reverted {
                reason: Some("insufficient balance".into())
            }
        );
    }

    #[tokio::test]
    async fn returns_that_do_not_decode_are_encoding_errors() {
        let node = Arc::new(MockNode::dev(2));
        let reader = executor(&node);

        // No contract lives at the holder address, so the call returns nothing.
        let err = reader
            .read_typed(
                account(1),
                &IERC20::balanceOfCall {
                    account: account(0),
                },
                BlockTag::Latest,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::Encoding(EncodingError::ReturnDecode(_))));
    }

    #[test_case(BatchMode::AllowPartialFailure ; "partial")]
    #[test_case(BatchMode::AllOrNothing ; "all or nothing")]
    #[tokio::test]
    async fn batch_with_a_reverting_member(mode: BatchMode) {
        let node = Arc::new(MockNode::dev(2));
        let reader = executor(&node);

        let outcome = reader
            .batch_read(
                &[balance_of(account(0)), transfer(1_000_000)],
                BlockTag::Latest,
                mode,
            )
            .await;

        match mode {
            BatchMode::AllowPartialFailure => {
                let results = outcome.expect("batch succeeds");
                assert_eq!(results.len(), 2);
                assert_eq!(
                    results[0].as_ref().map(|b| U256::from_be_slice(b)),
                    Ok(U256::from(1_000))
                );
                assert!(matches!(results[1], Err(ReadError::Reverted { .. })));
            }
            BatchMode::AllOrNothing => {
                assert!(matches!(outcome, Err(ReadError::Reverted { .. })));
            }
        }
    }

    #[tokio::test]
    async fn batch_serves_cached_members_locally() -> eyre::Result<()> {
        let node = Arc::new(MockNode::dev(2));
        node.mine();
        let reader = executor(&node);

        reader.read(&balance_of(account(0)), BlockTag::Number(1)).await?;
        let results = reader
            .batch_read(
                &[balance_of(account(0)), balance_of(account(1))],
                BlockTag::Number(1),
                BatchMode::AllOrNothing,
            )
            .await?;

        assert_eq!(results.len(), 2);
        assert_eq!(node.requests("eth_call"), 2);
        assert_eq!(reader.cache().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn slow_nodes_time_out() {
        let node = Arc::new(MockNode::dev(2));
        node.set_latency(Duration::from_millis(200));
        let reader = executor(&node);

        let err = reader
            .read_with_timeout(
                &balance_of(account(0)),
                BlockTag::Latest,
                Duration::from_millis(10),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ReadError::Timeout(Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn transport_failures_are_node_errors() {
        let node = Arc::new(MockNode::dev(2));
        node.set_offline(true);
        let reader = executor(&node);

        let err = reader
            .read(&balance_of(account(0)), BlockTag::Latest)
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::Node(NodeError::Transport(_))));
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_read() -> eyre::Result<()> {
        let node = Arc::new(MockNode::dev(2));
        node.mine();
        let reader = executor(&node);

        reader.read(&balance_of(account(0)), BlockTag::Number(1)).await?;
        assert_eq!(reader.invalidate_from(TOKEN, 1), 1);
        reader.read(&balance_of(account(0)), BlockTag::Number(1)).await?;

        assert_eq!(node.requests("eth_call"), 2);
        Ok(())
    }
}
