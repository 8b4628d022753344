//! Vault server address.

use url::Url;

use crate::error::{VaultError, VaultResult};

/// Location of a Vault server and its API prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultEndpoint {
    scheme: String,
    host: String,
    port: u16,
    path: String,
}

impl Default for VaultEndpoint {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: "localhost".to_string(),
            port: 8200,
            path: "v1".to_string(),
        }
    }
}

impl VaultEndpoint {
    /// Endpoint for `host:port` over HTTPS.
    #[must_use]
    pub fn create(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Parse an endpoint from a URI such as `https://vault:8200`.
    ///
    /// A missing port defaults to the scheme's well-known port; a missing
    /// path defaults to `v1`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] for unparsable URIs, schemes other
    /// than `http`/`https`, or URIs without a host.
    pub fn from_uri(uri: &str) -> VaultResult<Self> {
        let url = Url::parse(uri)
            .map_err(|e| VaultError::invalid_config(format!("invalid Vault URI {uri}: {e}")))?;

        let endpoint = Self::default().with_scheme(url.scheme())?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| VaultError::invalid_config(format!("Vault URI {uri} has no host")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| VaultError::invalid_config(format!("Vault URI {uri} has no port")))?;
        let path = url.path().trim_matches('/');

        Ok(Self {
            host: host.to_string(),
            port,
            path: if path.is_empty() { "v1".to_string() } else { path.to_string() },
            ..endpoint
        })
    }

    /// Switch the scheme.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] unless the scheme is `http` or `https`.
    pub fn with_scheme(mut self, scheme: &str) -> VaultResult<Self> {
        match scheme {
            "http" | "https" => {
                self.scheme = scheme.to_string();
                Ok(self)
            }
            other => Err(VaultError::invalid_config(format!("unsupported scheme: {other}"))),
        }
    }

    /// Use a different API prefix than `v1`.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into().trim_matches('/').to_string();
        self
    }

    /// Server host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// `http` or `https`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Base URL all API paths are resolved against, with a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.path.is_empty() {
            format!("{}://{}:{}/", self.scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}/", self.scheme, self.host, self.port, self.path)
        }
    }

    /// Absolute URL for an API path such as `sys/leases/renew`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidRequest`] if the result is not a valid URL.
    pub fn api_url(&self, path: &str) -> VaultResult<Url> {
        Url::parse(&self.base_url())
            .and_then(|base| base.join(path.trim_start_matches('/')))
            .map_err(|e| VaultError::InvalidRequest(format!("invalid API path {path}: {e}")))
    }
}
