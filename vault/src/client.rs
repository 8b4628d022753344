//! Vault HTTP client.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::backend::{AuthBackend, SecretBackend, SecretResponse};
use crate::config::{ClientAuthentication, VaultConfig};
use crate::endpoint::VaultEndpoint;
use crate::error::{VaultError, VaultResult};
use crate::lease::Lease;
use crate::secrets::{
    AuthResponse, ErrorResponse, KubernetesLoginRequest, LeaseRenewRequest, LeaseRenewResponse,
    LeaseRevokeRequest, LookupSelfResponse, ReadResponse,
};
use crate::session::SessionManager;
use crate::token::{Token, Validity};
use crate::transport::{HttpRequestFactory, HttpResponse, ReqwestRequestFactory, with_retries};

const TOKEN_HEADER: &str = "x-vault-token";
const NAMESPACE_HEADER: &str = "x-vault-namespace";

/// Client for the Vault HTTP API.
///
/// Authentication is performed through [`AuthBackend`]; secret operations take
/// the session token explicitly. [`SessionBoundClient`] pairs the client with
/// a [`SessionManager`] to provide a [`SecretBackend`].
pub struct VaultClient {
    endpoint: VaultEndpoint,
    namespace: Option<String>,
    authentication: ClientAuthentication,
    transport: Arc<dyn HttpRequestFactory>,
}

impl VaultClient {
    /// Create a client speaking through `transport`.
    #[must_use]
    pub fn new(
        endpoint: VaultEndpoint,
        authentication: ClientAuthentication,
        transport: Arc<dyn HttpRequestFactory>,
    ) -> Self {
        Self {
            endpoint,
            namespace: None,
            authentication,
            transport,
        }
    }

    /// Build a client with a retrying `reqwest` transport.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] for invalid configuration, or
    /// [`VaultError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &VaultConfig) -> VaultResult<Self> {
        config.validate()?;
        let http: Arc<dyn HttpRequestFactory> = Arc::new(ReqwestRequestFactory::new(&config.http)?);
        let client = Self::new(
            config.endpoint()?,
            config.authentication.clone(),
            with_retries(http, &config.retry),
        );
        Ok(match &config.namespace {
            Some(namespace) => client.with_namespace(namespace.clone()),
            None => client,
        })
    }

    /// Send `X-Vault-Namespace` with every request.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Server endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &VaultEndpoint {
        &self.endpoint
    }

    /// Read the secret at `path`.
    ///
    /// # Errors
    ///
    /// Returns the mapped Vault error for non-success responses, or a
    /// transport error.
    #[instrument(skip(self, token))]
    pub async fn read(&self, token: &Token, path: &str) -> VaultResult<SecretResponse> {
        let path = path.trim_start_matches('/');
        let response: ReadResponse = self.get(path, Some(token.expose())).await?;

        let lease = (!response.lease_id.is_empty()).then(|| {
            Lease::new(
                response.lease_id,
                path,
                response.data.clone(),
                Validity::from_ttl_secs(response.lease_duration),
                response.renewable,
            )
        });
        debug!(leased = lease.is_some(), "Read secret");

        Ok(SecretResponse {
            data: response.data,
            lease,
        })
    }

    /// Renew `lease` for another period of its current validity.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::LeaseNotRenewable`] without calling Vault for
    /// non-renewable leases, otherwise the mapped Vault error for
    /// non-success responses, or a transport error.
    #[instrument(skip(self, token, lease), fields(lease_id = %lease.lease_id))]
    pub async fn renew_lease(&self, token: &Token, lease: &Lease) -> VaultResult<Lease> {
        if !lease.renewable {
            return Err(VaultError::LeaseNotRenewable(lease.lease_id.clone()));
        }
        let body = LeaseRenewRequest {
            lease_id: &lease.lease_id,
            increment: lease.validity.as_duration().map(|d| d.as_secs()),
        };
        let response: LeaseRenewResponse = self
            .write(Method::PUT, "sys/leases/renew", Some(token.expose()), &body)
            .await?;

        debug!(lease_duration = response.lease_duration, "Renewed lease");
        Ok(lease.renewed(
            Validity::Finite(Duration::from_secs(response.lease_duration)),
            response.renewable,
        ))
    }

    /// Revoke the lease with `lease_id`.
    ///
    /// # Errors
    ///
    /// Returns the mapped Vault error for non-success responses, or a
    /// transport error.
    #[instrument(skip(self, token))]
    pub async fn revoke_lease(&self, token: &Token, lease_id: &str) -> VaultResult<()> {
        let body = serde_json::to_vec(&LeaseRevokeRequest { lease_id })?;
        self.send(Method::PUT, "sys/leases/revoke", Some(token.expose()), Some(body))
            .await?;
        debug!("Revoked lease");
        Ok(())
    }

    async fn lookup_self(&self, token: &str) -> VaultResult<Token> {
        let response: LookupSelfResponse = self.get("auth/token/lookup-self", Some(token)).await?;
        let validity = Validity::from_ttl_secs(response.data.ttl);

        info!(
            ttl_secs = response.data.ttl,
            renewable = response.data.renewable,
            "Using static Vault token"
        );
        Ok(Token::new(token, validity, response.data.renewable))
    }

    async fn kubernetes_login(
        &self,
        role: &str,
        jwt_path: &Path,
        mount: &str,
    ) -> VaultResult<Token> {
        let jwt = tokio::fs::read_to_string(jwt_path).await.map_err(|e| {
            VaultError::auth_failed(format!(
                "cannot read service account token {}: {e}",
                jwt_path.display()
            ))
        })?;

        let path = format!("auth/{}/login", mount.trim_matches('/'));
        let body = KubernetesLoginRequest {
            role,
            jwt: jwt.trim(),
        };
        let response: AuthResponse = self.write(Method::POST, &path, None, &body).await?;
        if response.auth.client_token.is_empty() {
            return Err(VaultError::auth_failed(format!("{path}: no client token in response")));
        }

        info!(
            role,
            ttl_secs = response.auth.lease_duration,
            "Authenticated with Vault"
        );
        Ok(Token::new(
            response.auth.client_token,
            Validity::from_ttl_secs(response.auth.lease_duration),
            response.auth.renewable,
        ))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> VaultResult<T> {
        self.send(Method::GET, path, token, None).await?.json()
    }

    async fn write<B, T>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> VaultResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(body)?;
        self.send(method, path, token, Some(body)).await?.json()
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> VaultResult<HttpResponse> {
        let url = self.endpoint.api_url(path)?;
        let mut request = self.transport.create_request(method, url).await?;

        if let Some(token) = token {
            let mut value = HeaderValue::from_str(token).map_err(|_| {
                VaultError::InvalidRequest("token is not a valid header value".to_string())
            })?;
            value.set_sensitive(true);
            request
                .headers_mut()
                .insert(HeaderName::from_static(TOKEN_HEADER), value);
        }
        if let Some(namespace) = &self.namespace {
            let value = HeaderValue::from_str(namespace).map_err(|_| {
                VaultError::invalid_config(format!(
                    "namespace {namespace} is not a valid header value"
                ))
            })?;
            request
                .headers_mut()
                .insert(HeaderName::from_static(NAMESPACE_HEADER), value);
        }
        if let Some(body) = body {
            request.set_body(body);
        }

        let response = request.execute().await?;
        check_status(path, &response)?;
        Ok(response)
    }
}

#[async_trait]
impl AuthBackend for VaultClient {
    #[instrument(skip(self))]
    async fn login(&self) -> VaultResult<Token> {
        match &self.authentication {
            ClientAuthentication::Token(token) => self.lookup_self(token.expose_secret()).await,
            ClientAuthentication::Kubernetes {
                role,
                jwt_path,
                mount,
            } => self.kubernetes_login(role, jwt_path, mount).await,
        }
    }

    #[instrument(skip(self, token))]
    async fn renew_token(&self, token: &Token) -> VaultResult<Token> {
        let response: AuthResponse = self
            .write(
                Method::POST,
                "auth/token/renew-self",
                Some(token.expose()),
                &serde_json::json!({}),
            )
            .await?;

        let value = if response.auth.client_token.is_empty() {
            token.expose().to_string()
        } else {
            response.auth.client_token
        };
        debug!(ttl_secs = response.auth.lease_duration, "Renewed token");
        Ok(Token::new(
            value,
            Validity::from_ttl_secs(response.auth.lease_duration),
            response.auth.renewable,
        ))
    }
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Map a Vault response status to the error it signals.
fn check_status(path: &str, response: &HttpResponse) -> VaultResult<()> {
    let status = response.status;
    if status.is_success() {
        return Ok(());
    }

    let message = error_message(response);
    Err(match status {
        StatusCode::BAD_REQUEST => VaultError::InvalidRequest(format!("{path}: {message}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if path.starts_with("auth/") => {
            VaultError::auth_failed(format!("{path}: {message}"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            VaultError::PermissionDenied(format!("{path}: {message}"))
        }
        StatusCode::NOT_FOUND => VaultError::not_found(path),
        StatusCode::TOO_MANY_REQUESTS => VaultError::RateLimited,
        s if s.is_server_error() => VaultError::unavailable(format!("Status {s}: {message}")),
        s => VaultError::InvalidRequest(format!("Status {s} for {path}: {message}")),
    })
}

fn error_message(response: &HttpResponse) -> String {
    response
        .json::<ErrorResponse>()
        .ok()
        .filter(|e| !e.errors.is_empty())
        .map_or_else(|| response.text(), |e| e.errors.join("; "))
}

/// [`SecretBackend`] authenticating every call with the current session token.
///
/// Calls run on behalf of the lease container, often in the background, so
/// they use [`SessionManager::current_token`] and leave any error of a failed
/// session renewal to the application. When Vault rejects the token the
/// session is invalidated so the next call logs in again.
pub struct SessionBoundClient {
    client: Arc<VaultClient>,
    session: Arc<dyn SessionManager>,
}

impl SessionBoundClient {
    /// Bind `client` to `session`.
    #[must_use]
    pub fn new(client: Arc<VaultClient>, session: Arc<dyn SessionManager>) -> Self {
        Self { client, session }
    }

    async fn authenticated<T, F, Fut>(&self, call: F) -> VaultResult<T>
    where
        F: FnOnce(Arc<Token>) -> Fut + Send,
        Fut: Future<Output = VaultResult<T>> + Send,
    {
        let token = self.session.current_token().await?;
        let result = call(token).await;
        if let Err(e) = &result {
            if e.is_authentication_rejected() {
                warn!(error = %e, "Vault rejected the session token, invalidating session");
                self.session.invalidate();
            }
        }
        result
    }
}

#[async_trait]
impl SecretBackend for SessionBoundClient {
    async fn read(&self, path: &str) -> VaultResult<SecretResponse> {
        self.authenticated(|token| async move { self.client.read(&token, path).await })
            .await
    }

    async fn renew_lease(&self, lease: &Lease) -> VaultResult<Lease> {
        self.authenticated(|token| async move { self.client.renew_lease(&token, lease).await })
            .await
    }

    async fn revoke_lease(&self, lease_id: &str) -> VaultResult<()> {
        self.authenticated(|token| async move {
            self.client.revoke_lease(&token, lease_id).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(StatusCode::from_u16(status).unwrap(), body.as_bytes().to_vec())
    }

    #[test]
    fn test_status_mapping() {
        assert!(check_status("secret/app", &response(200, "{}")).is_ok());
        assert!(check_status("sys/leases/revoke", &response(204, "")).is_ok());

        assert!(matches!(
            check_status("sys/leases/renew", &response(400, r#"{"errors":["lease not found"]}"#)),
            Err(VaultError::InvalidRequest(msg)) if msg.contains("lease not found")
        ));
        assert!(matches!(
            check_status("auth/kubernetes/login", &response(403, "")),
            Err(VaultError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            check_status("secret/app", &response(403, r#"{"errors":["permission denied"]}"#)),
            Err(VaultError::PermissionDenied(_))
        ));
        assert!(matches!(
            check_status("secret/missing", &response(404, "")),
            Err(VaultError::SecretNotFound(path)) if path == "secret/missing"
        ));
        assert!(matches!(
            check_status("secret/app", &response(429, "")),
            Err(VaultError::RateLimited)
        ));
        assert!(matches!(
            check_status("secret/app", &response(503, r#"{"errors":["Vault is sealed"]}"#)),
            Err(VaultError::Unavailable(msg)) if msg.contains("Vault is sealed")
        ));
    }

    #[test]
    fn test_error_message_falls_back_to_text() {
        assert_eq!(error_message(&response(502, "bad gateway")), "bad gateway");
        assert_eq!(
            error_message(&response(400, r#"{"errors":["a","b"]}"#)),
            "a; b"
        );
    }
}
