//! Vault client configuration.

use rust_common::{HttpConfig, RetryConfig};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;

use crate::endpoint::VaultEndpoint;
use crate::error::{VaultError, VaultResult};
use crate::trigger::RefreshTrigger;

/// Default minimum interval between lease renewals.
pub const DEFAULT_LEASE_MIN_RENEWAL: Duration = Duration::from_secs(10);
/// Default time before lease expiry at which renewal starts.
pub const DEFAULT_LEASE_EXPIRY_THRESHOLD: Duration = Duration::from_secs(60);

/// How the client authenticates against Vault.
#[derive(Debug, Clone)]
pub enum ClientAuthentication {
    /// Pre-issued token; login looks up its TTL.
    Token(SecretString),
    /// Kubernetes service account login.
    Kubernetes {
        /// Vault role bound to the service account
        role: String,
        /// Path of the service account JWT
        jwt_path: PathBuf,
        /// Auth method mount path
        mount: String,
    },
}

impl ClientAuthentication {
    /// Kubernetes auth with the in-cluster defaults.
    #[must_use]
    pub fn kubernetes(role: impl Into<String>) -> Self {
        Self::Kubernetes {
            role: role.into(),
            jwt_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token"),
            mount: "kubernetes".to_string(),
        }
    }

    /// Static token auth.
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(SecretString::from(token.into()))
    }

    fn validate(&self) -> VaultResult<()> {
        match self {
            Self::Token(token) if token.expose_secret().trim().is_empty() => {
                Err(VaultError::invalid_config("token authentication requires a token"))
            }
            Self::Kubernetes { role, .. } if role.is_empty() => {
                Err(VaultError::invalid_config("kubernetes authentication requires a role"))
            }
            Self::Kubernetes { mount, .. } if mount.is_empty() => {
                Err(VaultError::invalid_config("kubernetes authentication requires a mount path"))
            }
            _ => Ok(()),
        }
    }
}

/// Session (token) lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLifecycleConfig {
    /// Renew the token in the background. When disabled the token is obtained
    /// once and never renewed.
    pub enabled: bool,
    /// Minimum interval between renewals, also the backoff after a failed cycle
    pub min_renewal: Duration,
    /// Renew this long before the token expires
    pub expiry_threshold: Duration,
}

impl Default for SessionLifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_renewal: Duration::from_secs(1),
            expiry_threshold: Duration::from_secs(5),
        }
    }
}

impl SessionLifecycleConfig {
    /// Trigger derived from these settings.
    #[must_use]
    pub const fn trigger(&self) -> RefreshTrigger {
        RefreshTrigger::new(self.min_renewal, self.expiry_threshold)
    }
}

/// Lease lifecycle settings. Unset knobs fall back to the container defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseLifecycleConfig {
    /// Renew and rotate leases in the background
    pub enabled: bool,
    /// Minimum interval between renewals (default 10s)
    pub min_renewal: Option<Duration>,
    /// Renew this long before expiry (default 60s)
    pub expiry_threshold: Option<Duration>,
    /// Path prefixes whose leases are managed; `None` manages every lease
    pub lease_endpoints: Option<Vec<String>>,
    /// Buffered lease events per subscriber
    pub event_capacity: usize,
}

impl Default for LeaseLifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_renewal: None,
            expiry_threshold: None,
            lease_endpoints: None,
            event_capacity: 64,
        }
    }
}

impl LeaseLifecycleConfig {
    /// Trigger derived from these settings. Knobs only apply while the
    /// lifecycle is enabled.
    #[must_use]
    pub fn trigger(&self) -> RefreshTrigger {
        if !self.enabled {
            return RefreshTrigger::new(DEFAULT_LEASE_MIN_RENEWAL, DEFAULT_LEASE_EXPIRY_THRESHOLD);
        }
        RefreshTrigger::new(
            self.min_renewal.unwrap_or(DEFAULT_LEASE_MIN_RENEWAL),
            self.expiry_threshold.unwrap_or(DEFAULT_LEASE_EXPIRY_THRESHOLD),
        )
    }

    /// Whether leases issued for `path` are renewed and rotated.
    #[must_use]
    pub fn manages(&self, path: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.lease_endpoints.as_ref().is_none_or(|prefixes| {
            let path = path.trim_start_matches('/');
            prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.trim_start_matches('/')))
        })
    }

    /// Set the minimum renewal interval.
    #[must_use]
    pub const fn with_min_renewal(mut self, min_renewal: Duration) -> Self {
        self.min_renewal = Some(min_renewal);
        self
    }

    /// Set the expiry threshold.
    #[must_use]
    pub const fn with_expiry_threshold(mut self, threshold: Duration) -> Self {
        self.expiry_threshold = Some(threshold);
        self
    }

    /// Restrict background management to the given path prefixes.
    #[must_use]
    pub fn with_lease_endpoints<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lease_endpoints = Some(prefixes.into_iter().map(Into::into).collect());
        self
    }
}

/// Background worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of worker threads
    pub pool_size: usize,
    /// Worker thread name prefix
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            thread_name_prefix: "vault-lifecycle-".to_string(),
        }
    }
}

/// Vault client configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Full Vault URI; takes precedence over host/port/scheme
    pub uri: Option<String>,
    /// Vault host
    pub host: String,
    /// Vault port
    pub port: u16,
    /// `http` or `https`
    pub scheme: String,
    /// Enterprise namespace sent as `X-Vault-Namespace`
    pub namespace: Option<String>,
    /// Authentication method
    pub authentication: ClientAuthentication,
    /// Connect/read timeouts and pooling
    pub http: HttpConfig,
    /// Transport retry policy
    pub retry: RetryConfig,
    /// Token lifecycle
    pub session: SessionLifecycleConfig,
    /// Lease lifecycle
    pub lease: LeaseLifecycleConfig,
    /// Background scheduler
    pub scheduler: SchedulerConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            uri: std::env::var("VAULT_ADDR").ok(),
            host: "localhost".to_string(),
            port: 8200,
            scheme: "https".to_string(),
            namespace: std::env::var("VAULT_NAMESPACE").ok(),
            authentication: ClientAuthentication::token(
                std::env::var("VAULT_TOKEN").unwrap_or_default(),
            ),
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            session: SessionLifecycleConfig::default(),
            lease: LeaseLifecycleConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(uri: impl Into<String>, authentication: ClientAuthentication) -> Self {
        Self {
            uri: Some(uri.into()),
            authentication,
            ..Default::default()
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the transport retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set HTTP timeouts.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Set the session lifecycle.
    #[must_use]
    pub const fn with_session(mut self, session: SessionLifecycleConfig) -> Self {
        self.session = session;
        self
    }

    /// Set the lease lifecycle.
    #[must_use]
    pub fn with_lease(mut self, lease: LeaseLifecycleConfig) -> Self {
        self.lease = lease;
        self
    }

    /// Resolve the endpoint from `uri`, or from host/port/scheme.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] for malformed URIs or schemes.
    pub fn endpoint(&self) -> VaultResult<VaultEndpoint> {
        match self.uri.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(uri) => VaultEndpoint::from_uri(uri),
            None => VaultEndpoint::create(&self.host, self.port).with_scheme(&self.scheme),
        }
    }

    /// Check the configuration before anything is scheduled.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> VaultResult<()> {
        self.endpoint()?;
        self.authentication.validate()?;

        if self.namespace.as_deref().is_some_and(|ns| ns.trim().is_empty()) {
            return Err(VaultError::invalid_config("namespace must not be blank"));
        }
        if self.scheduler.pool_size == 0 {
            return Err(VaultError::invalid_config("scheduler pool size must be at least 1"));
        }
        if self.lease.event_capacity == 0 {
            return Err(VaultError::invalid_config("lease event capacity must be at least 1"));
        }
        if self.http.connect_timeout.is_zero() || self.http.read_timeout.is_zero() {
            return Err(VaultError::invalid_config("HTTP timeouts must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VaultConfig {
        VaultConfig::new("https://vault.internal:8200", ClientAuthentication::token("s.token"))
    }

    #[test]
    fn test_default_lifecycles() {
        let session = SessionLifecycleConfig::default();
        assert!(session.enabled);
        assert_eq!(session.expiry_threshold, Duration::from_secs(5));

        let lease = LeaseLifecycleConfig::default();
        assert_eq!(lease.trigger().min_renewal(), Duration::from_secs(10));
        assert_eq!(lease.trigger().expiry_threshold(), Duration::from_secs(60));

        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.pool_size, 2);
    }

    #[test]
    fn test_lease_knobs_apply_only_when_enabled() {
        let lease = LeaseLifecycleConfig::default()
            .with_min_renewal(Duration::from_secs(1))
            .with_expiry_threshold(Duration::from_secs(5));
        assert_eq!(lease.trigger().min_renewal(), Duration::from_secs(1));

        let disabled = LeaseLifecycleConfig {
            enabled: false,
            ..lease
        };
        assert_eq!(disabled.trigger().min_renewal(), DEFAULT_LEASE_MIN_RENEWAL);
        assert!(!disabled.manages("database/creds/readonly"));
    }

    #[test]
    fn test_lease_endpoints_filter() {
        let lease =
            LeaseLifecycleConfig::default().with_lease_endpoints(["database/", "aws/creds"]);
        assert!(lease.manages("database/creds/readonly"));
        assert!(lease.manages("/aws/creds/deploy"));
        assert!(!lease.manages("secret/data/app"));
        assert!(LeaseLifecycleConfig::default().manages("secret/data/app"));
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_endpoint_from_host_port() {
        let mut cfg = config();
        cfg.uri = None;
        cfg.host = "vault.svc".to_string();
        cfg.port = 8300;
        cfg.scheme = "http".to_string();

        let endpoint = cfg.endpoint().unwrap();
        assert_eq!(endpoint.base_url(), "http://vault.svc:8300/v1/");
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let mut cfg = config();
        cfg.uri = Some("ftp://vault".to_string());
        assert!(matches!(cfg.validate(), Err(VaultError::InvalidConfig(_))));

        let cfg = VaultConfig::new("https://vault:8200", ClientAuthentication::token(" "));
        assert!(cfg.validate().is_err());

        let cfg = VaultConfig::new("https://vault:8200", ClientAuthentication::kubernetes(""));
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.scheduler.pool_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.lease.event_capacity = 0;
        assert!(cfg.validate().is_err());

        let cfg = config().with_namespace("  ");
        assert!(cfg.validate().is_err());
    }
}
