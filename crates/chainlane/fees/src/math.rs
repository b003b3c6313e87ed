//! Integer fee arithmetic. Every operation rounds up and saturates.

/// Basis points in one whole.
pub const BPS: u128 = 10_000;

/// `raw * (1 + margin_bps / 10_000)`, rounded up.
pub fn apply_margin(raw: u64, margin_bps: u32) -> u64 {
    let scaled = (raw as u128) * (BPS + margin_bps as u128);
    let limit = scaled.div_ceil(BPS);
    u64::try_from(limit).unwrap_or(u64::MAX)
}

/// `value * (1 + pct / 100)`, rounded up.
pub fn bump_pct(value: u128, pct: u128) -> u128 {
    value.saturating_add(value.saturating_mul(pct).div_ceil(100))
}

/// `base_fee * multiplier + priority_fee`.
pub fn max_fee(base_fee: u128, multiplier: u128, priority_fee: u128) -> u128 {
    base_fee
        .saturating_mul(multiplier)
        .saturating_add(priority_fee)
}
