//! Capabilities the lifecycle managers need from Vault.

use async_trait::async_trait;

use crate::error::VaultResult;
use crate::lease::Lease;
use crate::token::Token;

/// Obtains and renews session tokens.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Authenticate and obtain a fresh token.
    async fn login(&self) -> VaultResult<Token>;

    /// Extend the validity of `token`.
    async fn renew_token(&self, token: &Token) -> VaultResult<Token>;
}

/// Result of reading a secret path.
#[derive(Debug, Clone)]
pub struct SecretResponse {
    /// Secret payload
    pub data: serde_json::Value,
    /// Lease attached to the payload, if the backend issued one
    pub lease: Option<Lease>,
}

/// Reads secrets and manages their leases.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Read the secret at `path`.
    async fn read(&self, path: &str) -> VaultResult<SecretResponse>;

    /// Extend `lease`; the returned lease carries the new validity.
    async fn renew_lease(&self, lease: &Lease) -> VaultResult<Lease>;

    /// Revoke the lease with `lease_id`.
    async fn revoke_lease(&self, lease_id: &str) -> VaultResult<()>;
}
