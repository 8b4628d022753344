//! Vault session and lease lifecycle management.
//!
//! Keeps a Vault token valid by renewing it ahead of expiry, and keeps
//! leased secrets alive by renewing them or, once renewal is no longer
//! possible, rotating them by reading their path again. Transport failures
//! are retried with a fixed backoff.

pub mod backend;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod lease;
pub mod lifecycle;
pub mod metrics;
pub mod scheduler;
mod secrets;
pub mod session;
pub mod token;
pub mod transport;
pub mod trigger;

pub use backend::{AuthBackend, SecretBackend, SecretResponse};
pub use client::{SessionBoundClient, VaultClient};
pub use config::{
    ClientAuthentication, LeaseLifecycleConfig, SchedulerConfig, SessionLifecycleConfig,
    VaultConfig,
};
pub use endpoint::VaultEndpoint;
pub use error::{VaultError, VaultResult};
pub use lease::{Lease, LeaseEvent, RemovalReason, SecretLeaseContainer};
pub use lifecycle::VaultLifecycle;
pub use metrics::LifecycleMetrics;
pub use scheduler::{ScheduledTask, TaskScheduler, TokioScheduler};
pub use session::{
    LifecycleAwareSessionManager, SessionManager, SessionState, SimpleSessionManager,
    create_session_manager,
};
pub use token::{Token, Validity};
pub use transport::{
    HttpRequest, HttpRequestFactory, HttpResponse, ReqwestRequestFactory, with_retries,
};
pub use trigger::RefreshTrigger;
