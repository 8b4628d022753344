//! Property-based tests for the lifecycle building blocks.
//!
//! Tests validate:
//! - Renewal scheduling stays within the validity window
//! - The retrying transport makes a bounded number of attempts
//! - Tokens and leases never expose secrets in debug output

use async_trait::async_trait;
use proptest::prelude::*;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use test_utils::{
    lease_id_strategy, retry_config_strategy, secret_path_strategy, trigger_strategy,
    validity_strategy,
};
use tokio::time::Instant;
use url::Url;
use vault_lifecycle::{
    HttpRequest, HttpRequestFactory, HttpResponse, Lease, Token, Validity, VaultError, VaultResult,
    with_retries,
};

/// Fails the first `failures` executions with a transport error.
struct FailingFactory {
    failures: u32,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl HttpRequestFactory for FailingFactory {
    async fn create_request(&self, method: Method, url: Url) -> VaultResult<Box<dyn HttpRequest>> {
        Ok(Box::new(FailingRequest {
            method,
            url,
            headers: HeaderMap::new(),
            failures: self.failures,
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct FailingRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    failures: u32,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl HttpRequest for FailingRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_body(&mut self, _body: Vec<u8>) {}

    async fn execute(&self) -> VaultResult<HttpResponse> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            Err(VaultError::unavailable("connection refused"))
        } else {
            Ok(HttpResponse::new(StatusCode::OK, b"{}".to_vec()))
        }
    }
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Next renewal never precedes the last one and never follows expiry
    /// when the validity covers the minimum renewal interval.
    #[test]
    fn prop_next_due_within_window(trigger in trigger_strategy(), validity in validity_strategy()) {
        let last_renewed = Instant::now();
        match validity {
            Validity::Infinite => prop_assert!(trigger.next_due(last_renewed, validity).is_none()),
            Validity::Finite(valid_for) => {
                let due = trigger.next_due(last_renewed, validity).unwrap();
                prop_assert!(due >= last_renewed);
                if trigger.min_renewal() <= valid_for {
                    prop_assert!(due <= last_renewed + valid_for);
                } else {
                    prop_assert_eq!(due, last_renewed + trigger.min_renewal());
                }
            }
        }
    }

    /// The decorator performs at most `max(N, 1)` attempts and succeeds
    /// exactly when a success falls within them.
    #[test]
    fn prop_bounded_attempts(config in retry_config_strategy(), failures in 0u32..10) {
        let budget = config.max_attempts.max(1);
        let calls = Arc::new(AtomicU32::new(0));
        let factory = with_retries(
            Arc::new(FailingFactory { failures, calls: Arc::clone(&calls) }),
            &config,
        );

        let result = paused_runtime().block_on(async {
            let url = Url::parse("https://vault:8200/v1/sys/health").unwrap();
            let request = factory.create_request(Method::GET, url).await.unwrap();
            request.execute().await
        });

        prop_assert_eq!(result.is_ok(), failures < budget);
        prop_assert_eq!(calls.load(Ordering::SeqCst), (failures + 1).min(budget));
    }

    /// Debug output of tokens and leases never contains the secret values.
    #[test]
    fn prop_secrets_redacted_in_debug(
        secret in "[A-Za-z0-9]{16,40}",
        lease_id in lease_id_strategy(),
        path in secret_path_strategy(),
    ) {
        let token = Token::new(format!("hvs.{secret}"), Validity::Infinite, false);
        let token_debug = format!("{token:?}");
        prop_assert!(!token_debug.contains(&secret));

        let lease = Lease::new(
            lease_id.clone(),
            path,
            serde_json::json!({ "password": secret.clone() }),
            Validity::Finite(Duration::from_secs(60)),
            true,
        );
        let debug = format!("{lease:?}");
        prop_assert!(debug.contains(&lease_id));
        prop_assert!(!debug.contains(&secret));
    }
}

#[test]
fn test_two_failures_then_success_waits_two_backoffs() {
    let calls = Arc::new(AtomicU32::new(0));
    let factory = with_retries(
        Arc::new(FailingFactory {
            failures: 2,
            calls: Arc::clone(&calls),
        }),
        &rust_common::RetryConfig::fixed(3, Duration::from_millis(100)),
    );

    let elapsed = paused_runtime().block_on(async {
        let start = Instant::now();
        let url = Url::parse("https://vault:8200/v1/sys/health").unwrap();
        let request = factory.create_request(Method::GET, url).await.unwrap();
        tokio_test::assert_ok!(request.execute().await);
        start.elapsed()
    });

    assert!(elapsed >= Duration::from_millis(200));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
