//! Vault API wire types.

use serde::{Deserialize, Serialize};

/// Response of `auth/*/login` and `auth/token/renew-self`.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub auth: AuthData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthData {
    pub client_token: String,
    pub lease_duration: u64,
    pub renewable: bool,
}

/// Response of `auth/token/lookup-self`.
#[derive(Debug, Deserialize)]
pub struct LookupSelfResponse {
    pub data: LookupSelfData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LookupSelfData {
    pub ttl: u64,
    pub renewable: bool,
}

/// Response of a plain secret read.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReadResponse {
    pub lease_id: String,
    pub lease_duration: u64,
    pub renewable: bool,
    pub data: serde_json::Value,
}

/// Response of `sys/leases/renew`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LeaseRenewResponse {
    pub lease_id: String,
    pub lease_duration: u64,
    pub renewable: bool,
}

/// Error body Vault attaches to non-success responses.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErrorResponse {
    pub errors: Vec<String>,
}

/// Body of `sys/leases/renew`.
#[derive(Debug, Serialize)]
pub struct LeaseRenewRequest<'a> {
    pub lease_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub increment: Option<u64>,
}

/// Body of `sys/leases/revoke`.
#[derive(Debug, Serialize)]
pub struct LeaseRevokeRequest<'a> {
    pub lease_id: &'a str,
}

/// Body of `auth/{mount}/login` for Kubernetes.
#[derive(Debug, Serialize)]
pub struct KubernetesLoginRequest<'a> {
    pub role: &'a str,
    pub jwt: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_response_without_lease() {
        let json = r#"{"data": {"data": {"api_key": "k"}, "metadata": {"version": 3}}}"#;
        let response: ReadResponse = serde_json::from_str(json).unwrap();
        assert!(response.lease_id.is_empty());
        assert_eq!(response.lease_duration, 0);
        assert_eq!(response.data["data"]["api_key"], "k");
    }

    #[test]
    fn test_read_response_with_lease() {
        let json = r#"{
            "lease_id": "database/creds/readonly/abc",
            "lease_duration": 3600,
            "renewable": true,
            "data": {"username": "v-token-readonly", "password": "pw"}
        }"#;
        let response: ReadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.lease_id, "database/creds/readonly/abc");
        assert!(response.renewable);
    }

    #[test]
    fn test_auth_response() {
        let json =
            r#"{"auth": {"client_token": "s.abc", "lease_duration": 2764800, "renewable": true}}"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.auth.client_token, "s.abc");
        assert_eq!(response.auth.lease_duration, 2_764_800);
    }

    #[test]
    fn test_renew_request_body() {
        let body = serde_json::to_value(LeaseRenewRequest {
            lease_id: "aws/creds/deploy/xyz",
            increment: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"lease_id": "aws/creds/deploy/xyz"}));
    }
}
