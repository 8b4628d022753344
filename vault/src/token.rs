//! Session tokens and validity periods.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::time::Instant;

/// How long a token or lease stays valid after it was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Expires after the given duration.
    Finite(Duration),
    /// Never expires (Vault reports a TTL of zero).
    Infinite,
}

impl Validity {
    /// Map a TTL as reported by Vault, where `0` means "does not expire".
    #[must_use]
    pub const fn from_ttl_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::Infinite
        } else {
            Self::Finite(Duration::from_secs(secs))
        }
    }

    /// Finite duration, if any.
    #[must_use]
    pub const fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Finite(d) => Some(*d),
            Self::Infinite => None,
        }
    }

    /// Whether this validity never runs out.
    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }
}

/// Authentication token issued by Vault.
///
/// Tokens are immutable: a login or renewal produces a new `Token` that
/// replaces the previous one.
#[derive(Debug, Clone)]
pub struct Token {
    token: SecretString,
    /// When the token was issued or last renewed
    pub issued_at: Instant,
    /// Validity counted from `issued_at`
    pub validity: Validity,
    /// Whether Vault accepts renewals for this token
    pub renewable: bool,
}

impl Token {
    /// Create a token issued now.
    #[must_use]
    pub fn new(token: impl Into<String>, validity: Validity, renewable: bool) -> Self {
        Self {
            token: SecretString::from(token.into()),
            issued_at: Instant::now(),
            validity,
            renewable,
        }
    }

    /// Override the issue instant.
    #[must_use]
    pub fn with_issued_at(mut self, issued_at: Instant) -> Self {
        self.issued_at = issued_at;
        self
    }

    /// The raw token value, for request headers only.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.token.expose_secret()
    }

    /// Instant after which Vault no longer accepts the token.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.validity.as_duration().map(|d| self.issued_at + d)
    }

    /// Whether the token's validity has fully elapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|expiry| now >= expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ttl_is_infinite() {
        assert_eq!(Validity::from_ttl_secs(0), Validity::Infinite);
        assert_eq!(
            Validity::from_ttl_secs(3600),
            Validity::Finite(Duration::from_secs(3600))
        );
        assert!(Validity::Infinite.as_duration().is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = Token::new("s.super-secret", Validity::Infinite, false);
        let debug = format!("{token:?}");
        assert!(!debug.contains("s.super-secret"));
        assert_eq!(token.expose(), "s.super-secret");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let token = Token::new("s.abc", Validity::Finite(Duration::from_secs(10)), true);
        assert!(!token.is_expired_at(Instant::now()));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(token.is_expired_at(Instant::now()));

        let forever = Token::new("s.root", Validity::Infinite, false);
        assert!(forever.expires_at().is_none());
        assert!(!forever.is_expired_at(Instant::now() + Duration::from_secs(86_400)));
    }
}
