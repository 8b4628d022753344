//! HTTP transport abstraction and its retrying decorator.
//!
//! The Vault client never talks to `reqwest` directly: it asks an
//! [`HttpRequestFactory`] for requests, which lets the retry decorator wrap
//! construction and execution without the client knowing.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use rust_common::{HttpConfig, RetryConfig, RetryPolicy, build_http_client};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::error::{VaultError, VaultResult};

/// Response as received from Vault, fully buffered.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: StatusCode,
    /// Raw body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Serialization`] if the body does not decode.
    pub fn json<T: DeserializeOwned>(&self) -> VaultResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as text, for error messages.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A request that can be executed, and re-executed, against Vault.
#[async_trait]
pub trait HttpRequest: Send + Sync {
    /// HTTP method.
    fn method(&self) -> &Method;

    /// Target URL.
    fn url(&self) -> &Url;

    /// Headers sent with the request.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Set the JSON body.
    fn set_body(&mut self, body: Vec<u8>);

    /// Send the request and buffer the response.
    ///
    /// Non-success statuses are returned as responses, never as errors.
    /// Errors mean the exchange itself failed.
    async fn execute(&self) -> VaultResult<HttpResponse>;
}

/// Creates [`HttpRequest`]s.
#[async_trait]
pub trait HttpRequestFactory: Send + Sync {
    /// Create a request for `method` and `url`.
    async fn create_request(&self, method: Method, url: Url) -> VaultResult<Box<dyn HttpRequest>>;
}

/// [`HttpRequestFactory`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestRequestFactory {
    client: Client,
}

impl ReqwestRequestFactory {
    /// Build the client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Http`] if the client cannot be built.
    pub fn new(config: &HttpConfig) -> VaultResult<Self> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    /// Use an existing client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpRequestFactory for ReqwestRequestFactory {
    async fn create_request(&self, method: Method, url: Url) -> VaultResult<Box<dyn HttpRequest>> {
        if url.host_str().is_none() {
            return Err(VaultError::InvalidRequest(format!("URL has no host: {url}")));
        }
        Ok(Box::new(ReqwestRequest {
            client: self.client.clone(),
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }))
    }
}

struct ReqwestRequest {
    client: Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

#[async_trait]
impl HttpRequest for ReqwestRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_body(&mut self, body: Vec<u8>) {
        self.body = Some(body);
    }

    async fn execute(&self) -> VaultResult<HttpResponse> {
        let mut request = self
            .client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        debug!(
            method = %self.method,
            path = self.url.path(),
            status = status.as_u16(),
            "Vault responded"
        );
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

fn transport_error(e: reqwest::Error) -> VaultError {
    if e.is_builder() {
        VaultError::InvalidRequest(e.to_string())
    } else {
        VaultError::unavailable(e.to_string())
    }
}

/// Decorator retrying request construction and execution on transient errors.
pub struct RetryingRequestFactory {
    delegate: Arc<dyn HttpRequestFactory>,
    policy: RetryPolicy,
}

impl RetryingRequestFactory {
    /// Wrap `delegate`.
    #[must_use]
    pub fn new(delegate: Arc<dyn HttpRequestFactory>, config: RetryConfig) -> Self {
        Self {
            delegate,
            policy: RetryPolicy::new(config),
        }
    }
}

#[async_trait]
impl HttpRequestFactory for RetryingRequestFactory {
    async fn create_request(&self, method: Method, url: Url) -> VaultResult<Box<dyn HttpRequest>> {
        let delegate = &*self.delegate;
        let request = self
            .policy
            .execute(move || {
                let (method, url) = (method.clone(), url.clone());
                async move { delegate.create_request(method, url).await }
            })
            .await?;

        Ok(Box::new(RetryingRequest {
            delegate: request,
            policy: self.policy.clone(),
        }))
    }
}

struct RetryingRequest {
    delegate: Box<dyn HttpRequest>,
    policy: RetryPolicy,
}

#[async_trait]
impl HttpRequest for RetryingRequest {
    fn method(&self) -> &Method {
        self.delegate.method()
    }

    fn url(&self) -> &Url {
        self.delegate.url()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.delegate.headers_mut()
    }

    fn set_body(&mut self, body: Vec<u8>) {
        self.delegate.set_body(body);
    }

    async fn execute(&self) -> VaultResult<HttpResponse> {
        let delegate = &*self.delegate;
        self.policy.execute(move || delegate.execute()).await
    }
}

/// Apply `config` to `delegate`. With retries disabled the delegate is
/// returned as is.
#[must_use]
pub fn with_retries(
    delegate: Arc<dyn HttpRequestFactory>,
    config: &RetryConfig,
) -> Arc<dyn HttpRequestFactory> {
    if config.is_enabled() {
        Arc::new(RetryingRequestFactory::new(delegate, config.clone()))
    } else {
        delegate
    }
}
