use std::{ops::RangeInclusive, time::Duration};

use crate::error::FeeConfigError;

/// Accepted gas margins: 1.10x to 1.25x.
pub const MARGIN_BPS_RANGE: RangeInclusive<u32> = 1_000..=2_500;

pub const DEFAULT_MARGIN_BPS: u32 = 2_000;
pub const DEFAULT_BASE_FEE_MULTIPLIER: u128 = 2;
pub const DEFAULT_CONGESTION_THRESHOLD_PCT: u64 = 90;
pub const DEFAULT_CONGESTION_PRIORITY_BUMP_PCT: u128 = 25;
/// 0.1 gwei
pub const DEFAULT_MIN_PRIORITY_FEE: u128 = 100_000_000;

/// Fee estimation parameters. Built through [`FeeConfig::builder`], which
/// validates the margin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeConfig {
    margin_bps: u32,
    base_fee_multiplier: u128,
    congestion_threshold_pct: u64,
    congestion_priority_bump_pct: u128,
    min_priority_fee: u128,
    timeout: Duration,
}

#[bon::bon]
impl FeeConfig {
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MARGIN_BPS)] margin_bps: u32,
        #[builder(default = DEFAULT_BASE_FEE_MULTIPLIER)] base_fee_multiplier: u128,
        #[builder(default = DEFAULT_CONGESTION_THRESHOLD_PCT)] congestion_threshold_pct: u64,
        #[builder(default = DEFAULT_CONGESTION_PRIORITY_BUMP_PCT)]
        congestion_priority_bump_pct: u128,
        #[builder(default = DEFAULT_MIN_PRIORITY_FEE)] min_priority_fee: u128,
        #[builder(default = Duration::from_secs(10))] timeout: Duration,
    ) -> Result<Self, FeeConfigError> {
        if !MARGIN_BPS_RANGE.contains(&margin_bps) {
            return Err(FeeConfigError::MarginOutOfRange(margin_bps));
        }
        if base_fee_multiplier == 0 {
            return Err(FeeConfigError::ZeroMultiplier);
        }
        Ok(Self {
            margin_bps,
            base_fee_multiplier,
            congestion_threshold_pct,
            congestion_priority_bump_pct,
            min_priority_fee,
            timeout,
        })
    }

    pub const fn margin_bps(&self) -> u32 {
        self.margin_bps
    }

    pub const fn base_fee_multiplier(&self) -> u128 {
        self.base_fee_multiplier
    }

    /// Block utilization, in percent, above which the priority fee is bumped.
    pub const fn congestion_threshold_pct(&self) -> u64 {
        self.congestion_threshold_pct
    }

    pub const fn congestion_priority_bump_pct(&self) -> u128 {
        self.congestion_priority_bump_pct
    }

    pub const fn min_priority_fee(&self) -> u128 {
        self.min_priority_fee
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            margin_bps: DEFAULT_MARGIN_BPS,
            base_fee_multiplier: DEFAULT_BASE_FEE_MULTIPLIER,
            congestion_threshold_pct: DEFAULT_CONGESTION_THRESHOLD_PCT,
            congestion_priority_bump_pct: DEFAULT_CONGESTION_PRIORITY_BUMP_PCT,
            min_priority_fee: DEFAULT_MIN_PRIORITY_FEE,
            timeout: Duration::from_secs(10),
        }
    }
}
