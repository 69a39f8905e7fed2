//! Retry strategies for remote calls.

use std::future::Future;
use std::time::Duration;

use tenantsync_core::FetchError;
use tracing::warn;

use crate::context::Context;

/// Strategy for retrying failed requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStrategy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between retries.
    pub base_delay: Duration,
    /// Whether to use exponential backoff.
    pub exponential_backoff: bool,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl RetryStrategy {
    /// Creates a new retry strategy.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(500),
            exponential_backoff: true,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            exponential_backoff: false,
            max_delay: Duration::ZERO,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Enables or disables exponential backoff.
    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    /// Calculates the delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = if self.exponential_backoff {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.base_delay.saturating_mul(factor)
        } else {
            self.base_delay
        };

        delay.min(self.max_delay)
    }

    /// Determines if an error should be retried.
    pub fn should_retry(&self, error: &FetchError) -> bool {
        error.is_transient()
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Backoff sleeps are abandoned as soon as `ctx` is cancelled. A
    /// rate-limit response's `retry_after` takes precedence over the
    /// computed delay.
    pub async fn run<F, Fut, T>(&self, ctx: &Context, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            ctx.check()?;

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= self.max_attempts || !self.should_retry(&error) {
                return Err(error);
            }

            let delay = match error.root() {
                FetchError::RateLimited {
                    retry_after: Some(secs),
                } => Duration::from_secs(*secs).min(self.max_delay),
                _ => self.delay_for_attempt(attempt),
            };
            warn!(
                error = %error,
                attempt,
                delay_ms = delay.as_millis(),
                "Request failed, retrying"
            );

            ctx.run(async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(3)
    }
}
