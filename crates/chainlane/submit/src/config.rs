use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct SubmitConfig {
    /// Quotes older than this are refused.
    #[builder(default = Duration::from_secs(60))]
    pub quote_horizon: Duration,
    /// Minimum increase, in percent, of both fee caps for a replacement or
    /// cancellation.
    #[builder(default = 10)]
    pub min_replacement_bump_pct: u128,
    #[builder(default = Duration::from_secs(30))]
    pub timeout: Duration,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
