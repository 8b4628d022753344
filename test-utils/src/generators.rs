//! Shared proptest generators for lifecycle types.

use proptest::prelude::*;
use rust_common::RetryConfig;
use std::time::Duration;
use vault_lifecycle::{RefreshTrigger, Validity};

/// Generate Vault TTLs in seconds, `0` meaning "never expires".
pub fn ttl_secs_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        1 => Just(0u64),
        9 => 1u64..=2_764_800,
    ]
}

/// Generate validities, mostly finite.
pub fn validity_strategy() -> impl Strategy<Value = Validity> {
    ttl_secs_strategy().prop_map(Validity::from_ttl_secs)
}

/// Generate refresh triggers with second-granularity settings.
pub fn trigger_strategy() -> impl Strategy<Value = RefreshTrigger> {
    (0u64..3_600, 0u64..7_200).prop_map(|(min_renewal, threshold)| {
        RefreshTrigger::new(Duration::from_secs(min_renewal), Duration::from_secs(threshold))
    })
}

/// Generate retry configurations with millisecond backoffs.
pub fn retry_config_strategy() -> impl Strategy<Value = RetryConfig> {
    (0u32..8, 0u64..500).prop_map(|(attempts, backoff)| {
        RetryConfig::fixed(attempts, Duration::from_millis(backoff))
    })
}

/// Generate secret paths.
pub fn secret_path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("database/creds/readonly".to_string()),
        Just("aws/creds/deploy".to_string()),
        prop::collection::vec("[a-z][a-z0-9]{2,10}", 1..4)
            .prop_map(|segments| format!("secret/data/{}", segments.join("/"))),
    ]
}

/// Generate lease ids as Vault formats them: `{path}/{random}`.
pub fn lease_id_strategy() -> impl Strategy<Value = String> {
    (secret_path_strategy(), "[A-Za-z0-9]{24}")
        .prop_map(|(path, suffix)| format!("{path}/{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_lease_ids_extend_their_path(id in lease_id_strategy()) {
            prop_assert!(id.contains('/'));
            prop_assert!(!id.ends_with('/'));
        }

        #[test]
        fn test_retry_configs_bounded(config in retry_config_strategy()) {
            prop_assert!(config.max_attempts < 8);
            prop_assert!(config.backoff < Duration::from_millis(500));
        }
    }
}
