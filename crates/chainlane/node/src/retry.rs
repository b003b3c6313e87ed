//! Exponential backoff for transient node failures.
//!
//! Only errors for which [`NodeError::is_transient`] holds are retried. Reverts,
//! rejections and decode failures are deterministic and surface immediately.

use std::{future::Future, time::Duration};

use tracing::warn;

use crate::error::NodeError;

/// Backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Integer growth factor applied per attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed):
    /// `min(initial * multiplier^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `f` until it succeeds, fails permanently, or retries run out.
    pub async fn retry<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(RetryError::Permanent(err)),
                Err(err) if attempt >= self.max_retries => {
                    return Err(RetryError::Exhausted {
                        operation,
                        attempts: attempt + 1,
                        last: err,
                    })
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        target: "chainlane::node",
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient node failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last: NodeError,
    },
    #[error(transparent)]
    Permanent(NodeError),
}

impl RetryError {
    pub fn into_inner(self) -> NodeError {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Permanent(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1_000),
            multiplier: 2,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let res = fast_policy(3)
            .retry("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(NodeError::Transport("connection reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(res, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = fast_policy(2)
            .retry("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::Transport("down".into()))
            })
            .await;
        assert!(matches!(res, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_reverts() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = fast_policy(5)
            .retry("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::revert(Default::default()))
            })
            .await;
        assert!(matches!(res, Err(RetryError::Permanent(NodeError::Revert { .. }))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
