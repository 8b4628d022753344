//! Errors raised by the lifecycle crate.
//!
//! Every failure maps to a [`VaultError`]. [`VaultError::is_retryable`] is
//! what the retrying transport consults, and
//! [`VaultError::is_authentication_rejected`] tells a session-bound client
//! to drop its token.

use rust_common::{PlatformError, Retryable};
use thiserror::Error;

/// Failure of a Vault call or of the lifecycle machinery around it.
#[derive(Error, Debug)]
pub enum VaultError {
    /// I/O failure, refused or reset connection, timeout, or a 5xx answer
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// Transport error from the HTTP client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Vault answered 429
    #[error("Rate limited")]
    RateLimited,

    /// Login refused, or the token was rejected on an `auth/` path
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Token lacks the policy for the requested path
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Nothing stored at the path
    #[error("Secret not found at path: {0}")]
    SecretNotFound(String),

    /// Vault refused the request as malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Lease renewal rejected by the backend
    #[error("Lease renewal failed for {lease_id}: {reason}")]
    LeaseRenewalFailed {
        /// Lease that could not be renewed
        lease_id: String,
        /// Backend or transport reason
        reason: String,
    },

    /// Renewal requested for a lease Vault marked non-renewable
    #[error("Lease is not renewable: {0}")]
    LeaseNotRenewable(String),

    /// Lease id unknown to the container
    #[error("Lease not found: {0}")]
    LeaseNotFound(String),

    /// Re-reading the path of an expiring lease failed
    #[error("Rotation failed for {path}: {reason}")]
    RotationFailed {
        /// Secret path that was re-read
        path: String,
        /// Why the replacement could not be obtained
        reason: String,
    },

    /// Response body did not match the expected shape
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rejected before anything was scheduled
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Component was shut down
    #[error("Lifecycle component has been shut down")]
    Shutdown,

    /// Failure from the shared helpers
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result alias for this crate.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Whether the retrying transport may attempt the call again.
    ///
    /// Only transport-level failures qualify; anything Vault answered with a
    /// status code, other than rate limiting, is a semantic error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::RateLimited | Self::Http(_) => true,
            Self::Platform(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether Vault refused the credentials used for the request.
    #[must_use]
    pub const fn is_authentication_rejected(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_) | Self::PermissionDenied(_)
        )
    }

    /// [`VaultError::Unavailable`] with `msg`.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// [`VaultError::AuthenticationFailed`] with `msg`.
    #[must_use]
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// [`VaultError::SecretNotFound`] for `path`.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::SecretNotFound(path.into())
    }

    /// [`VaultError::InvalidConfig`] with `msg`.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl Retryable for VaultError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}
