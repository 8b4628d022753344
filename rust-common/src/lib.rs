//! Shared retry, HTTP, metrics and tracing helpers for the vault-lifecycle workspace.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration and building
//! - Retry policies with bounded attempts and fixed backoff
//! - Tracing subscriber setup
//! - Prometheus metrics helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod metrics;
pub mod retry;
pub mod tracing_config;

pub use error::{PlatformError, Retryable};
pub use http::{HttpConfig, build_http_client};
pub use metrics::{Counter, Gauge};
pub use retry::{RetryConfig, RetryPolicy};
pub use tracing_config::{LogFormat, TracingConfig, init_tracing, try_init_tracing};
