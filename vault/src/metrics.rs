//! Lifecycle counters in Prometheus text format.

use rust_common::{Counter, Gauge};

/// Counters shared by the session manager and the lease container.
#[derive(Debug)]
pub struct LifecycleMetrics {
    /// Successful logins
    pub logins: Counter,
    /// Successful token renewals
    pub token_renewals: Counter,
    /// Renewal cycles where both renewal and login failed
    pub session_failures: Counter,
    /// Successful lease renewals
    pub lease_renewals: Counter,
    /// Leases replaced by a fresh read
    pub lease_rotations: Counter,
    /// Leases removed from the registry
    pub lease_removals: Counter,
    /// Leases currently tracked
    pub active_leases: Gauge,
}

impl LifecycleMetrics {
    /// Create metrics named `{prefix}_*`.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            logins: Counter::new(format!("{prefix}_logins_total"), "Successful Vault logins"),
            token_renewals: Counter::new(
                format!("{prefix}_token_renewals_total"),
                "Successful token renewals",
            ),
            session_failures: Counter::new(
                format!("{prefix}_session_failures_total"),
                "Renewal cycles that could neither renew nor log in",
            ),
            lease_renewals: Counter::new(
                format!("{prefix}_lease_renewals_total"),
                "Successful lease renewals",
            ),
            lease_rotations: Counter::new(
                format!("{prefix}_lease_rotations_total"),
                "Leases replaced by re-reading their path",
            ),
            lease_removals: Counter::new(
                format!("{prefix}_lease_removals_total"),
                "Leases removed from the registry",
            ),
            active_leases: Gauge::new(
                format!("{prefix}_active_leases"),
                "Leases currently tracked",
            ),
        }
    }

    /// Render every metric.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        [
            self.logins.to_prometheus(),
            self.token_renewals.to_prometheus(),
            self.session_failures.to_prometheus(),
            self.lease_renewals.to_prometheus(),
            self.lease_rotations.to_prometheus(),
            self.lease_removals.to_prometheus(),
            self.active_leases.to_prometheus(),
        ]
        .concat()
    }
}

impl Default for LifecycleMetrics {
    fn default() -> Self {
        Self::new("vault")
    }
}
