//! Retry policy with a bounded attempt count and fixed backoff.
//!
//! Only errors whose [`Retryable`] classification says so are retried; the
//! last error is returned once the budget is spent.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Retryable;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one. `0` disables retries.
    pub max_attempts: u32,
    /// Fixed delay between two attempts
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Create a fixed-backoff configuration.
    #[must_use]
    pub const fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Configuration that never retries.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Set the maximum number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the delay between attempts.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether retrying is switched on at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }
}

/// Retry policy for executing operations with automatic retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Delay applied before the next attempt.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.config.backoff
    }

    /// Check if an error should be retried after `attempt` attempts were made.
    #[must_use]
    pub fn should_retry<E: Retryable>(&self, error: &E, attempt: u32) -> bool {
        attempt < self.max_attempts() && error.is_retryable()
    }

    /// Execute an async operation with retries.
    ///
    /// The operation runs at most [`max_attempts`](Self::max_attempts) times.
    /// Non-retryable errors are returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the last error if all attempts are exhausted.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts(),
                        delay_ms =
                            u64::try_from(self.config.backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(self.config.backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Get the maximum number of attempts. Never less than one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlatformError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.backoff, Duration::from_secs(1));
        assert!(config.is_enabled());
        assert!(!RetryConfig::disabled().is_enabled());
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::new(RetryConfig::fixed(3, Duration::from_millis(10)));

        assert!(policy.should_retry(&PlatformError::RateLimited, 1));
        assert!(policy.should_retry(&PlatformError::RateLimited, 2));
        assert!(!policy.should_retry(&PlatformError::RateLimited, 3));
        assert!(!policy.should_retry(&PlatformError::invalid_input("empty path"), 1));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let policy = RetryPolicy::with_defaults();
        let result: Result<i32, PlatformError> = policy.execute(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_execute_non_retryable_error() {
        let policy = RetryPolicy::with_defaults();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<i32, PlatformError> = policy
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PlatformError::invalid_input("empty path"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_waits_two_backoffs() {
        let policy = RetryPolicy::new(RetryConfig::fixed(3, Duration::from_millis(100)));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = tokio::time::Instant::now();

        let result: Result<&str, PlatformError> = policy
            .execute(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(PlatformError::unavailable("connection reset"))
                } else {
                    Ok("ok")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_returns_last_error() {
        let policy = RetryPolicy::new(RetryConfig::fixed(3, Duration::from_millis(5)));
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), PlatformError> = policy
            .execute(move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(PlatformError::unavailable(format!("attempt {n}")))
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "Service unavailable: attempt 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let policy = RetryPolicy::new(RetryConfig::disabled());
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), PlatformError> = policy
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PlatformError::RateLimited)
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
