use std::time::Duration;

use chainlane_node::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct EventConfig {
    /// Blocks per `eth_getLogs` query.
    #[builder(default = 2_000)]
    pub chunk_size: u64,
    /// Blocks below the head whose hashes are remembered for reorg detection.
    #[builder(default = 64)]
    pub reorg_window: u64,
    #[builder(default = Duration::from_secs(2))]
    pub poll_interval: Duration,
    /// Deadline for one poll round and for each historical window.
    #[builder(default = Duration::from_secs(10))]
    pub request_timeout: Duration,
    #[builder(default)]
    pub retry: RetryPolicy,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
