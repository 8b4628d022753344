//! Shared error classification.
//!
//! [`RetryPolicy`](crate::RetryPolicy) works with any error implementing
//! [`Retryable`]. [`PlatformError`] covers failures raised by the helpers in
//! this crate and converts into the crate-specific error types.

use thiserror::Error;

/// Decides whether a failed operation may be attempted again.
pub trait Retryable {
    /// `true` for transient failures.
    fn is_retryable(&self) -> bool;
}

/// Failures of shared infrastructure.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Building or sending an HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote side unreachable or refusing work for now
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Remote side asked us to slow down
    #[error("Rate limited")]
    RateLimited,

    /// Deadline elapsed before completion
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Caller supplied something unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PlatformError {
    /// Transient failures: unavailability, throttling, timeouts, and
    /// transport errors.
    ///
    /// ```
    /// use rust_common::PlatformError;
    ///
    /// assert!(PlatformError::RateLimited.is_retryable());
    /// assert!(!PlatformError::invalid_input("empty path").is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidInput(_))
    }

    /// Unavailable error with `msg`.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Invalid input error with `msg`.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl Retryable for PlatformError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(PlatformError::RateLimited.is_retryable());
        assert!(PlatformError::unavailable("sealed").is_retryable());
        assert!(PlatformError::Timeout("read".to_string()).is_retryable());
        assert!(!PlatformError::invalid_input("blank").is_retryable());
    }

    #[test]
    fn test_trait_agrees_with_inherent() {
        for err in [PlatformError::RateLimited, PlatformError::invalid_input("x")] {
            assert_eq!(Retryable::is_retryable(&err), err.is_retryable());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            PlatformError::unavailable("vault").to_string(),
            "Service unavailable: vault"
        );
    }
}
