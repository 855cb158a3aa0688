//! Bounded retry with optional exponential backoff.
//!
//! The policy never looks at the error it is handed. Callers that want to
//! stop early on a non-retryable failure fold it into the `Ok` side of the
//! operation (see the result writer).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::RetryExhausted;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_secs(1), exponential: true }
    }
}

impl RetryPolicy {
    /// `max_retries` is the total number of attempts and is clamped to at least 1.
    pub fn new(max_retries: u32, base_delay: Duration, exponential: bool) -> Self {
        Self { max_retries: max_retries.max(1), base_delay, exponential }
    }

    /// Single attempt, no sleeping.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, false)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay slept after the failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.exponential {
            self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
        } else {
            self.base_delay
        }
    }

    pub async fn execute<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(RetryExhausted { attempts: attempt, last: err });
                    }
                    let delay = self.delay_for(attempt - 1);
                    warn!(attempt, max = self.max_retries, ?delay, error = %err, "attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
