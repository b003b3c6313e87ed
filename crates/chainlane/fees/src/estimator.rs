use std::{sync::Arc, time::Instant};

use alloy_eips::eip1559::{calc_next_block_base_fee, BaseFeeParams};
use alloy_primitives::Address;
use chainlane_node::{with_timeout, NodeClient, NodeError};
use chainlane_primitives::{BlockTag, CallDescriptor};
use tracing::debug;

use crate::{config::FeeConfig, error::EstimationError, math, quote::FeeQuote};

/// Produces [`FeeQuote`]s for pending writes.
#[derive(Debug)]
pub struct FeeEstimator<N> {
    node: Arc<N>,
    config: FeeConfig,
}

impl<N: NodeClient> FeeEstimator<N> {
    pub fn new(node: Arc<N>, config: FeeConfig) -> Self {
        Self { node, config }
    }

    pub const fn config(&self) -> &FeeConfig {
        &self.config
    }

    /// Quotes gas and fees for `descriptor` sent by `from`.
    ///
    /// The call is simulated against the pending block; a revert yields
    /// [`EstimationError::SimulationReverted`] and never a numeric quote.
    pub async fn estimate(
        &self,
        descriptor: &CallDescriptor,
        from: Address,
    ) -> Result<FeeQuote, EstimationError> {
        let timeout = self.config.timeout();
        with_timeout(timeout, self.quote(descriptor, from))
            .await
            .map_err(|_| EstimationError::Timeout(timeout))?
    }

    async fn quote(
        &self,
        descriptor: &CallDescriptor,
        from: Address,
    ) -> Result<FeeQuote, EstimationError> {
        let request = descriptor.to_request(Some(from));
        let (raw_gas_estimate, header, priority_fee, chain_id) = tokio::try_join!(
            self.node.estimate_gas(&request, BlockTag::Pending),
            self.node.block_header(BlockTag::Latest),
            self.node.max_priority_fee_per_gas(),
            self.node.chain_id(),
        )?;

        let header = header.ok_or_else(|| NodeError::Decode("latest block not found".into()))?;
        let parent_base_fee = header
            .base_fee_per_gas
            .ok_or(EstimationError::MissingBaseFee)?;
        let base_fee = calc_next_block_base_fee(
            header.gas_used,
            header.gas_limit,
            parent_base_fee,
            BaseFeeParams::ethereum(),
        ) as u128;

        let mut max_priority_fee = priority_fee.max(self.config.min_priority_fee());
        let utilization = header.utilization_pct();
        if utilization > self.config.congestion_threshold_pct() {
            max_priority_fee =
                math::bump_pct(max_priority_fee, self.config.congestion_priority_bump_pct());
        }

        let quote = FeeQuote {
            gas_limit: math::apply_margin(raw_gas_estimate, self.config.margin_bps()),
            raw_gas_estimate,
            base_fee,
            max_priority_fee,
            max_fee: math::max_fee(
                base_fee,
                self.config.base_fee_multiplier(),
                max_priority_fee,
            ),
            block_number: header.number,
            chain_id,
            from,
            descriptor: descriptor.digest(),
            quoted_at: Instant::now(),
        };

        debug!(
            target: "chainlane::fees",
            %from,
            block = header.number,
            utilization,
            gas_limit = quote.gas_limit(),
            max_fee = quote.max_fee(),
            max_priority_fee = quote.max_priority_fee(),
            "fee quote"
        );
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use chainlane_primitives::contracts::IERC20;
    use chainlane_test_utils::{account, MockNode, GWEI, TOKEN};
    use std::time::Duration;

    fn transfer(amount: u64) -> CallDescriptor {
        CallDescriptor::from_call(
            TOKEN,
            &IERC20::transferCall {
                to: account(1),
                amount: U256::from(amount),
            },
        )
    }

    fn estimator(node: &Arc<MockNode>) -> FeeEstimator<MockNode> {
        FeeEstimator::new(node.clone(), FeeConfig::default())
    }

    #[tokio::test]
    async fn quotes_include_margin_and_headroom() -> eyre::Result<()> {
        let node = Arc::new(MockNode::dev(2));
        node.set_base_fee(10 * GWEI as u64);
        node.set_priority_fee(2 * GWEI);

        let quote = estimator(&node).estimate(&transfer(10), account(0)).await?;

        assert_eq!(quote.raw_gas_estimate(), 51_000);
        assert_eq!(quote.gas_limit(), 61_200);
        // Empty head block: next base fee drops by 1/8.
        assert_eq!(quote.base_fee(), 8_750_000_000);
        assert_eq!(quote.max_priority_fee(), 2 * GWEI);
        assert_eq!(quote.max_fee(), 2 * 8_750_000_000 + 2 * GWEI);
        assert_eq!(quote.block_number(), 0);
        assert_eq!(quote.chain_id(), chainlane_test_utils::DEV_CHAIN_ID);
        assert!(quote.covers(&transfer(10), account(0)));
        assert!(!quote.covers(&transfer(11), account(0)));
        Ok(())
    }

    #[tokio::test]
    async fn congestion_bumps_the_priority_fee() -> eyre::Result<()> {
        let node = Arc::new(MockNode::dev(2));
        node.set_priority_fee(4 * GWEI);
        node.set_head_utilization(95);

        let quote = estimator(&node).estimate(&transfer(10), account(0)).await?;
        assert_eq!(quote.max_priority_fee(), 5 * GWEI);
        assert!(quote.base_fee() > GWEI);
        Ok(())
    }

    #[tokio::test]
    async fn priority_fee_is_floored() -> eyre::Result<()> {
        let node = Arc::new(MockNode::dev(2));
        node.set_priority_fee(0);

        let quote = estimator(&node).estimate(&transfer(10), account(0)).await?;
        assert_eq!(
            quote.max_priority_fee(),
            crate::config::DEFAULT_MIN_PRIORITY_FEE
        );
        Ok(())
    }

    #[tokio::test]
    async fn reverting_calls_never_produce_a_quote() {
        let node = Arc::new(MockNode::dev(2));

        let err = estimator(&node)
            .estimate(&transfer(1_000_000), account(0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EstimationError::SimulationReverted {
                reason: Some("insufficient balance".into())
            }
        );
        assert_eq!(node.requests("eth_sendRawTransaction"), 0);
    }

    #[tokio::test]
    async fn slow_nodes_time_out() {
        let node = Arc::new(MockNode::dev(2));
        node.set_latency(Duration::from_millis(200));
        let config = FeeConfig::builder()
            .timeout(Duration::from_millis(10))
            .build()
            .expect("valid config");

        let err = FeeEstimator::new(node, config)
            .estimate(&transfer(10), account(0))
            .await
            .unwrap_err();
        assert_eq!(err, EstimationError::Timeout(Duration::from_millis(10)));
    }
}
