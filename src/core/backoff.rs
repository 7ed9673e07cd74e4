//! Deadline-bounded exponential backoff
//!
//! Shared by the upload-verification poll, the completion-flag patch retry
//! and the transfer-completion poll.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Delay schedule that doubles each attempt, optionally capped per attempt,
/// and gives up once the overall deadline has passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max_interval: Option<Duration>,
    pub deadline: Duration,
}

/// Outcome of one attempt inside [`ExponentialBackoff::run`]
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// Stop with this value
    Done(T),
    /// Try again after the next delay
    Retry(E),
}

/// Why [`ExponentialBackoff::run`] stopped without a value
#[derive(Debug)]
pub enum Exhausted<E> {
    /// The deadline passed; holds the last retryable reason and the time spent
    Deadline { last: E, waited: Duration },
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max_interval: Option<Duration>, deadline: Duration) -> Self {
        Self {
            initial,
            max_interval,
            deadline,
        }
    }

    /// Delay before attempt `n + 1`, given `n` attempts so far
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.initial.saturating_mul(factor);
        match self.max_interval {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Runs `operation` until it returns [`Attempt::Done`] or the deadline passes
    ///
    /// The first attempt runs immediately. A sleep never extends past the
    /// deadline; one final attempt is made at the deadline.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let started = Instant::now();
        let deadline = started + self.deadline;
        let mut attempt = 0u32;

        loop {
            let reason = match operation().await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry(reason) => reason,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(Exhausted::Deadline {
                    last: reason,
                    waited: now - started,
                });
            }

            let delay = self.delay_for(attempt).min(deadline - now);
            attempt = attempt.saturating_add(1);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Backing off before next attempt"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
