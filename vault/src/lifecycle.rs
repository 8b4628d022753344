//! Entry point wiring session and lease management together.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::backend::SecretBackend;
use crate::client::{SessionBoundClient, VaultClient};
use crate::config::{LeaseLifecycleConfig, VaultConfig};
use crate::error::VaultResult;
use crate::lease::{Lease, LeaseEvent, SecretLeaseContainer};
use crate::metrics::LifecycleMetrics;
use crate::scheduler::{TaskScheduler, TokioScheduler};
use crate::session::{SessionManager, SessionState, create_session_manager};
use crate::token::Token;

/// Vault access with managed token and lease lifecycles.
///
/// Dropping the lifecycle shuts it down.
pub struct VaultLifecycle {
    session: Arc<dyn SessionManager>,
    leases: SecretLeaseContainer,
    metrics: Arc<LifecycleMetrics>,
    _scheduler: Arc<dyn TaskScheduler>,
}

impl VaultLifecycle {
    /// Connect to Vault over HTTP with a dedicated background scheduler.
    ///
    /// No request is sent until a token or secret is first requested; call
    /// [`get_token`](Self::get_token) right away to log in eagerly.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`](crate::VaultError::InvalidConfig)
    /// for invalid configuration, or an error if the HTTP client or the
    /// scheduler cannot be started.
    pub fn connect(config: &VaultConfig) -> VaultResult<Self> {
        config.validate()?;
        let scheduler: Arc<dyn TaskScheduler> =
            Arc::new(TokioScheduler::dedicated(&config.scheduler)?);
        let client = Arc::new(VaultClient::from_config(config)?);
        let metrics = Arc::new(LifecycleMetrics::default());

        let session = create_session_manager(
            &config.session,
            Arc::clone(&client) as _,
            Arc::clone(&scheduler),
            Arc::clone(&metrics),
        );
        let secrets = Arc::new(SessionBoundClient::new(client, Arc::clone(&session)));

        info!(
            endpoint = %config.endpoint()?.base_url(),
            session_lifecycle = config.session.enabled,
            lease_lifecycle = config.lease.enabled,
            "Vault lifecycle configured"
        );
        Ok(Self::from_parts(
            config.lease.clone(),
            session,
            secrets,
            scheduler,
            metrics,
        ))
    }

    /// Assemble from injected components.
    #[must_use]
    pub fn from_parts(
        lease: LeaseLifecycleConfig,
        session: Arc<dyn SessionManager>,
        secrets: Arc<dyn SecretBackend>,
        scheduler: Arc<dyn TaskScheduler>,
        metrics: Arc<LifecycleMetrics>,
    ) -> Self {
        let leases = SecretLeaseContainer::new(
            secrets,
            Arc::clone(&scheduler),
            lease,
            Arc::clone(&metrics),
        );
        Self {
            session,
            leases,
            metrics,
            _scheduler: scheduler,
        }
    }

    /// Current session token.
    ///
    /// # Errors
    ///
    /// Returns the login error, a renewal error recorded since the last call,
    /// or [`VaultError::Shutdown`](crate::VaultError::Shutdown).
    pub async fn get_token(&self) -> VaultResult<Arc<Token>> {
        self.session.token().await
    }

    /// Read `path`, tracking the lease Vault issues with it.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn read_secret(
        &self,
        path: &str,
    ) -> VaultResult<(serde_json::Value, Option<Arc<Lease>>)> {
        self.leases.read_secret(path).await
    }

    /// Receive lease events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LeaseEvent> {
        self.leases.subscribe()
    }

    /// Revoke a lease; it is removed locally even if Vault refuses.
    ///
    /// # Errors
    ///
    /// Returns the backend error after the lease was removed.
    pub async fn revoke(&self, lease_id: &str) -> VaultResult<()> {
        self.leases.revoke(lease_id).await
    }

    /// Stop tracking a lease without revoking it.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::LeaseNotFound`](crate::VaultError::LeaseNotFound)
    /// for unknown ids.
    pub fn drop_lease(&self, lease_id: &str) -> VaultResult<Arc<Lease>> {
        self.leases.drop_lease(lease_id)
    }

    /// Snapshot of tracked leases.
    #[must_use]
    pub fn leases(&self) -> Vec<Arc<Lease>> {
        self.leases.leases()
    }

    /// Lease container.
    #[must_use]
    pub const fn lease_container(&self) -> &SecretLeaseContainer {
        &self.leases
    }

    /// Lifecycle metrics.
    #[must_use]
    pub fn metrics(&self) -> &LifecycleMetrics {
        &self.metrics
    }

    /// Session state.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Stop all background work. Idempotent.
    pub fn shutdown(&self) {
        if self.leases.is_shut_down() {
            return;
        }
        self.leases.shutdown();
        self.session.shutdown();
        info!("Vault lifecycle shut down");
    }
}

impl Drop for VaultLifecycle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for VaultLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultLifecycle")
            .field("session", &self.session.state())
            .field("leases", &self.leases)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientAuthentication;

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let config = VaultConfig::new("ftp://vault:21", ClientAuthentication::token("s.token"));
        assert!(VaultLifecycle::connect(&config).is_err());
    }

    #[tokio::test]
    async fn test_connect_is_lazy() {
        // Nothing listens here; connecting must not send requests.
        let config = VaultConfig::new("http://127.0.0.1:1", ClientAuthentication::token("s.token"));
        let lifecycle = VaultLifecycle::connect(&config).unwrap();

        assert_eq!(lifecycle.session_state(), SessionState::Uninitialized);
        assert!(lifecycle.leases().is_empty());

        lifecycle.shutdown();
        assert_eq!(lifecycle.session_state(), SessionState::Terminated);
        assert!(matches!(
            lifecycle.get_token().await,
            Err(crate::VaultError::Shutdown)
        ));
    }
}
