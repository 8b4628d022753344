//! Vault API response bodies for HTTP-level tests.

use serde_json::{Value, json};

/// Body of `auth/token/lookup-self`.
#[must_use]
pub fn lookup_self_body(ttl: u64, renewable: bool) -> Value {
    json!({
        "request_id": "8f3b2c1e-lookup",
        "data": {
            "accessor": "hmac-accessor",
            "policies": ["default", "app"],
            "ttl": ttl,
            "renewable": renewable,
        }
    })
}

/// Body of a login or `auth/token/renew-self`.
#[must_use]
pub fn auth_body(client_token: &str, lease_duration: u64, renewable: bool) -> Value {
    json!({
        "request_id": "8f3b2c1e-auth",
        "auth": {
            "client_token": client_token,
            "accessor": "hmac-accessor",
            "policies": ["default", "app"],
            "lease_duration": lease_duration,
            "renewable": renewable,
        }
    })
}

/// Body of a read issuing database credentials under a lease.
#[must_use]
pub fn leased_read_body(lease_id: &str, lease_duration: u64, renewable: bool) -> Value {
    json!({
        "request_id": "8f3b2c1e-read",
        "lease_id": lease_id,
        "lease_duration": lease_duration,
        "renewable": renewable,
        "data": {
            "username": "v-app-readonly-x1y2",
            "password": "A1a-generated",
        }
    })
}

/// Body of a KV v2 read, which carries no lease.
#[must_use]
pub fn kv_read_body(data: &Value) -> Value {
    json!({
        "request_id": "8f3b2c1e-kv",
        "lease_id": "",
        "lease_duration": 0,
        "renewable": false,
        "data": {
            "data": data,
            "metadata": { "version": 1 }
        }
    })
}

/// Body of `sys/leases/renew`.
#[must_use]
pub fn lease_renew_body(lease_id: &str, lease_duration: u64) -> Value {
    json!({
        "lease_id": lease_id,
        "lease_duration": lease_duration,
        "renewable": true,
    })
}

/// Error body as Vault returns it.
#[must_use]
pub fn error_body(message: &str) -> Value {
    json!({ "errors": [message] })
}
