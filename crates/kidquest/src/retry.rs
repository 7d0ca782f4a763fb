//! Exponential-backoff retry loop.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::ClientConfig;
use crate::error::ApiError;

/// Decides whether a failed attempt is re-attempted and how long to wait.
///
/// Attempt `n` (1-based) that fails with a retryable error is followed by a
/// sleep of `base_delay * 2^(n-1)`, until `max_attempts` have been made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `retries` additional attempts after the first.
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            base_delay,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.retries, config.retry_delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay applied after a failed `attempt`, before the next one.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether `error` from `attempt` should be followed by another attempt.
    pub fn should_retry(&self, error: &ApiError, attempt: u32, skip_retry: bool) -> bool {
        error.is_retryable() && !skip_retry && attempt < self.max_attempts
    }

    /// Run `operation` until it succeeds or the policy stops.
    ///
    /// `operation` receives the 1-based attempt number. With `skip_retry`
    /// exactly one attempt is made.
    pub async fn run<T, F, Fut>(&self, skip_retry: bool, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !self.should_retry(&error, attempt, skip_retry) => return Err(error),
                Err(error) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        kind = %error.kind,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RETRIES, crate::config::DEFAULT_RETRY_DELAY)
    }
}
