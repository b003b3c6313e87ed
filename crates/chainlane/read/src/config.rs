use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct ReadConfig {
    /// Deadline applied by [`ReadExecutor::read`](crate::ReadExecutor::read).
    #[builder(default = Duration::from_secs(10))]
    pub timeout: Duration,
    /// Maximum cached historical results. `0` disables caching.
    #[builder(default = 4096)]
    pub cache_capacity: usize,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
