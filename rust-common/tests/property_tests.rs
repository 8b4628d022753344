//! Property-based tests for rust-common crate.
//!
//! These tests verify universal properties across all inputs using proptest.

use proptest::prelude::*;
use rust_common::{Counter, Gauge, PlatformError, RetryConfig, RetryPolicy, Retryable};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

// **Property: Retry Classification Consistency**
// *For any* message, transient error variants are retryable and semantic
// error variants are not, through both the inherent method and the trait.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_retryable_errors_are_consistent(
        msg in "[a-zA-Z0-9 ]{1,50}"
    ) {
        let retryable_errors = [
            PlatformError::RateLimited,
            PlatformError::Unavailable(msg.clone()),
            PlatformError::Timeout(msg.clone()),
        ];

        for err in retryable_errors {
            prop_assert!(err.is_retryable(), "Error {:?} should be retryable", err);
            prop_assert!(Retryable::is_retryable(&err));
        }

        let err = PlatformError::invalid_input(msg);
        prop_assert!(!err.is_retryable(), "Error {:?} should not be retryable", err);
    }
}

// **Property: Bounded Attempts**
// *For any* attempt budget N >= 1, an operation failing N-1 times then
// succeeding returns success after exactly N attempts, and an operation that
// always fails is attempted exactly N times.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_succeeds_on_last_allowed_attempt(max_attempts in 1u32..8) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async {
            let policy =
                RetryPolicy::new(RetryConfig::fixed(max_attempts, Duration::from_millis(100)));
            let calls = AtomicU32::new(0);
            let counter = &calls;

            let result: Result<u32, PlatformError> = policy
                .execute(move || async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < max_attempts {
                        Err(PlatformError::unavailable("connection refused"))
                    } else {
                        Ok(n)
                    }
                })
                .await;

            prop_assert_eq!(result.unwrap(), max_attempts);
            prop_assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
            Ok(())
        })?;
    }

    #[test]
    fn prop_exhausted_budget_stops_at_max(max_attempts in 0u32..8) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async {
            let policy =
                RetryPolicy::new(RetryConfig::fixed(max_attempts, Duration::from_millis(10)));
            let calls = AtomicU32::new(0);
            let counter = &calls;

            let result: Result<(), PlatformError> = policy
                .execute(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(PlatformError::Timeout("read".to_string()))
                })
                .await;

            prop_assert!(result.is_err());
            prop_assert_eq!(calls.load(Ordering::SeqCst), max_attempts.max(1));
            Ok(())
        })?;
    }
}

// **Property: Metric Exposition**
// *For any* number of increments, the Prometheus rendering carries the
// counter value and the gauge tracks inc/dec without underflow.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_metric_values_render(incs in 0u64..500, decs in 0u64..600) {
        let counter = Counter::new("vault_renewals_total", "Renewals");
        let gauge = Gauge::new("vault_active_leases", "Active leases");

        for _ in 0..incs {
            counter.inc();
            gauge.inc();
        }
        for _ in 0..decs {
            gauge.dec();
        }

        let rendered = counter.to_prometheus();
        let expected_line = format!("vault_renewals_total {incs}");
        prop_assert!(rendered.contains(&expected_line));
        prop_assert_eq!(gauge.get(), incs.saturating_sub(decs));
    }
}
