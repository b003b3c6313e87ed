/// Gas and fee caps a broadcast transaction carried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeCaps {
    pub gas_limit: u64,
    pub max_fee: u128,
    pub max_priority_fee: u128,
}

impl FeeCaps {
    /// Upper bound on what the transaction can cost, in wei.
    pub fn max_cost(&self) -> u128 {
        (self.gas_limit as u128).saturating_mul(self.max_fee)
    }
}
