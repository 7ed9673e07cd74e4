//! Linear retry policy for continuation publishes

use crate::domain::Result;
use std::future::Future;
use std::time::Duration;

/// Delay before retry `n` is `interval_start + n * interval_step`, capped at
/// `interval_max`; at most `max_retries` retries follow the first attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval_start: Duration,
    pub interval_step: Duration,
    pub interval_max: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval_start: Duration::ZERO,
            interval_step: Duration::from_secs(2),
            interval_max: Duration::from_secs(30),
            max_retries: 60,
        }
    }
}

impl RetryPolicy {
    pub fn interval(&self, retry: u32) -> Duration {
        self.interval_step
            .checked_mul(retry)
            .and_then(|step| self.interval_start.checked_add(step))
            .map_or(self.interval_max, |delay| delay.min(self.interval_max))
    }

    /// Runs `op` until it succeeds or the retries are used up
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retry < self.max_retries => {
                    let delay = self.interval(retry);
                    tracing::warn!(
                        what,
                        retry = retry + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExporterError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_interval_grows_linearly_and_caps() {
        let policy = RetryPolicy {
            interval_start: Duration::from_secs(1),
            interval_step: Duration::from_secs(2),
            interval_max: Duration::from_secs(6),
            max_retries: 10,
        };
        assert_eq!(policy.interval(0), Duration::from_secs(1));
        assert_eq!(policy.interval(1), Duration::from_secs(3));
        assert_eq!(policy.interval(2), Duration::from_secs(5));
        assert_eq!(policy.interval(3), Duration::from_secs(6));
        assert_eq!(policy.interval(u32::MAX), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let value = policy
            .retry("publish", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ExporterError::Broker("connection reset".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_retries() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .retry("publish", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExporterError::Broker("down".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ExporterError::Broker(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
