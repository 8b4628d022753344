//! HTTP client construction.
//!
//! The timeouts configured here are the only per-call time bounds the Vault
//! transport applies; retries happen above the client.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Timeouts and pooling for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Bound on a whole request, including reading the body (default: 15s)
    pub read_timeout: Duration,
    /// Bound on establishing a connection (default: 5s)
    pub connect_timeout: Duration,
    /// How long idle pooled connections are kept (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Sent as `User-Agent`
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: concat!("vault-lifecycle/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    /// Set the request timeout.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Build a rustls-backed client from `config`.
///
/// # Errors
///
/// Returns the reqwest error if TLS initialization fails.
///
/// ```
/// use rust_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default().with_read_timeout(Duration::from_secs(30));
/// assert!(build_http_client(&config).is_ok());
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    ClientBuilder::new()
        .timeout(config.read_timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .user_agent(&config.user_agent)
        .use_rustls_tls()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(15));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.user_agent.starts_with("vault-lifecycle/"));
    }

    #[test]
    fn test_timeouts_override() {
        let config = HttpConfig::default()
            .with_read_timeout(Duration::from_secs(60))
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert!(build_http_client(&config).is_ok());
    }
}
