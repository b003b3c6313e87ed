use std::time::Duration;

use chainlane_node::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct WatchConfig {
    #[builder(default = Duration::from_secs(2))]
    pub poll_interval: Duration,
    /// A successful operation is final once more than this many blocks sit on
    /// top of its inclusion block.
    #[builder(default = 12)]
    pub finality_depth: u64,
    /// How long the node may not know a pending transaction before it is
    /// considered dropped.
    #[builder(default = Duration::from_secs(120))]
    pub drop_timeout: Duration,
    /// Deadline for one polling step against the node.
    #[builder(default = Duration::from_secs(10))]
    pub request_timeout: Duration,
    #[builder(default)]
    pub retry: RetryPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
