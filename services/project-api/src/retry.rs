//! Bounded retry with exponential backoff.
//!
//! Used for calls to the key authority. Store calls are never retried here;
//! `StoreUnavailable` is handed back to the caller.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Backoff schedule for a retried call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first call fails
    pub max_retries: u32,
    /// Wait before the first retry
    pub initial_delay: Duration,
    /// Ceiling for any single wait
    pub max_delay: Duration,
    /// Growth factor between consecutive waits
    pub multiplier: f64,
    /// Stretch each wait by up to a quarter, at random
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Sets the number of retries
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the first wait
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the wait ceiling
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disables jitter, making waits deterministic
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Runs fallible async operations under a [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Policy following `config`
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Wait before retry number `attempt` (zero-based), capped at `max_delay`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let growth = self
            .config
            .multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let ceiling_ms = self.config.max_delay.as_millis() as f64;
        let mut delay_ms = (self.config.initial_delay.as_millis() as f64 * growth).min(ceiling_ms);
        if self.config.jitter {
            delay_ms *= 1.0 + rand::random::<f64>() * 0.25;
        }
        Duration::from_millis(delay_ms as u64)
    }

    /// Calls `operation` until it succeeds, fails with an error `retryable`
    /// rejects, or the retries run out.
    ///
    /// # Errors
    ///
    /// The error of the last attempt.
    pub async fn execute<F, Fut, T, E, P>(&self, mut operation: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if attempt >= self.config.max_retries || !retryable(&error) {
                return Err(error);
            }
            let delay = self.delay_for_attempt(attempt);
            debug!(attempt = attempt + 1, ?delay, "Retrying after transient failure");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
