use std::time::{Duration, Instant};

use alloy_primitives::{Address, B256};
use chainlane_primitives::{CallDescriptor, FeeCaps};

/// Gas and fee parameters for one pending write, computed at a specific block.
///
/// Only [`FeeEstimator::estimate`](crate::FeeEstimator::estimate) issues
/// quotes, so holding one means the call simulated without reverting. A
/// submitter refuses quotes older than its configured horizon and quotes
/// computed for a different call or sender.
///
/// ```compile_fail
/// use std::time::Instant;
///
/// let quote = chainlane_fees::FeeQuote {
///     gas_limit: 21_000,
///     raw_gas_estimate: 21_000,
///     base_fee: 1,
///     max_priority_fee: 1,
///     max_fee: 2,
///     block_number: 0,
///     chain_id: 1,
///     from: Default::default(),
///     descriptor: Default::default(),
///     quoted_at: Instant::now(),
/// };
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeQuote {
    pub(crate) gas_limit: u64,
    pub(crate) raw_gas_estimate: u64,
    pub(crate) base_fee: u128,
    pub(crate) max_priority_fee: u128,
    pub(crate) max_fee: u128,
    pub(crate) block_number: u64,
    pub(crate) chain_id: u64,
    pub(crate) from: Address,
    pub(crate) descriptor: B256,
    pub(crate) quoted_at: Instant,
}

impl FeeQuote {
    /// Gas limit including the safety margin.
    pub const fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Simulated gas before the margin was applied.
    pub const fn raw_gas_estimate(&self) -> u64 {
        self.raw_gas_estimate
    }

    /// Projected base fee for the next block, in wei.
    pub const fn base_fee(&self) -> u128 {
        self.base_fee
    }

    pub const fn max_priority_fee(&self) -> u128 {
        self.max_priority_fee
    }

    pub const fn max_fee(&self) -> u128 {
        self.max_fee
    }

    /// Height of the block the quote was derived from.
    pub const fn block_number(&self) -> u64 {
        self.block_number
    }

    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub const fn from(&self) -> Address {
        self.from
    }

    /// [`CallDescriptor::digest`] of the quoted call.
    pub const fn descriptor(&self) -> B256 {
        self.descriptor
    }

    pub const fn quoted_at(&self) -> Instant {
        self.quoted_at
    }

    pub fn is_stale(&self, horizon: Duration) -> bool {
        self.quoted_at.elapsed() > horizon
    }

    /// Whether this quote was computed for `descriptor` sent by `from`.
    pub fn covers(&self, descriptor: &CallDescriptor, from: Address) -> bool {
        self.from == from && self.descriptor == descriptor.digest()
    }

    /// Upper bound on what the write can cost, in wei.
    pub fn max_cost(&self) -> u128 {
        self.caps().max_cost()
    }

    pub const fn caps(&self) -> FeeCaps {
        FeeCaps {
            gas_limit: self.gas_limit,
            max_fee: self.max_fee,
            max_priority_fee: self.max_priority_fee,
        }
    }

    /// The same quote with its fee caps raised to at least `max_fee` and
    /// `max_priority_fee`. Caps are never lowered.
    pub fn with_fees(&self, max_fee: u128, max_priority_fee: u128) -> Self {
        Self {
            max_fee: self.max_fee.max(max_fee),
            max_priority_fee: self.max_priority_fee.max(max_priority_fee),
            ..self.clone()
        }
    }
}
