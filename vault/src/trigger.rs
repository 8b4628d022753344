//! Renewal timing policy shared by sessions and leases.

use std::time::Duration;
use tokio::time::Instant;

use crate::token::Validity;

/// Computes when a token or lease should next be renewed.
///
/// Renewal is attempted `expiry_threshold` before expiry, but never sooner
/// than `min_renewal` after the last renewal so the backend is not hammered
/// by short-lived credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTrigger {
    min_renewal: Duration,
    expiry_threshold: Duration,
}

impl RefreshTrigger {
    /// Create a trigger.
    #[must_use]
    pub const fn new(min_renewal: Duration, expiry_threshold: Duration) -> Self {
        Self {
            min_renewal,
            expiry_threshold,
        }
    }

    /// Minimum interval between two renewals.
    #[must_use]
    pub const fn min_renewal(&self) -> Duration {
        self.min_renewal
    }

    /// How long before expiry renewal is attempted.
    #[must_use]
    pub const fn expiry_threshold(&self) -> Duration {
        self.expiry_threshold
    }

    /// Instant of the next renewal, or `None` when `validity` never expires.
    ///
    /// A threshold larger than the validity clamps to `last_renewed`, subject
    /// to the minimum renewal interval.
    #[must_use]
    pub fn next_due(&self, last_renewed: Instant, validity: Validity) -> Option<Instant> {
        let valid_for = validity.as_duration()?;
        let before_expiry = last_renewed + valid_for.saturating_sub(self.expiry_threshold);
        let earliest = last_renewed + self.min_renewal;
        Some(before_expiry.max(earliest))
    }

    /// Delay from `now` until `due`; zero means "due now".
    #[must_use]
    pub fn delay_until(due: Instant, now: Instant) -> Duration {
        due.saturating_duration_since(now)
    }

    /// Delay from `now` until the next renewal, or `None` if never due.
    #[must_use]
    pub fn next_delay(
        &self,
        last_renewed: Instant,
        validity: Validity,
        now: Instant,
    ) -> Option<Duration> {
        self.next_due(last_renewed, validity)
            .map(|due| Self::delay_until(due, now))
    }

    /// Whether a renewal performed at `renewed_at` failed to extend validity.
    ///
    /// Vault caps renewals at the maximum TTL, so a grant of zero or one that
    /// ends before `previous_expiry` means further renewals are pointless and
    /// fresh credentials are needed.
    #[must_use]
    pub fn is_exhausted(
        previous_expiry: Option<Instant>,
        renewed_at: Instant,
        validity: Validity,
    ) -> bool {
        match (validity.as_duration(), previous_expiry) {
            (Some(granted), _) if granted.is_zero() => true,
            (Some(granted), Some(previous)) => renewed_at + granted < previous,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_renews_threshold_before_expiry() {
        let trigger = RefreshTrigger::new(secs(10), secs(30));
        let t0 = Instant::now();

        let due = trigger.next_due(t0, Validity::Finite(secs(60))).unwrap();
        assert_eq!(due - t0, secs(30));
    }

    #[test]
    fn test_min_renewal_wins_for_short_validity() {
        let trigger = RefreshTrigger::new(secs(10), secs(30));
        let t0 = Instant::now();

        let due = trigger.next_due(t0, Validity::Finite(secs(35))).unwrap();
        assert_eq!(due - t0, secs(10));
    }

    #[test]
    fn test_threshold_beyond_validity_clamps_to_last_renewed() {
        let trigger = RefreshTrigger::new(Duration::ZERO, secs(120));
        let t0 = Instant::now();

        let due = trigger.next_due(t0, Validity::Finite(secs(60))).unwrap();
        assert_eq!(due, t0);
        assert_eq!(RefreshTrigger::delay_until(due, t0 + secs(5)), Duration::ZERO);
    }

    #[test]
    fn test_infinite_validity_never_due() {
        let trigger = RefreshTrigger::new(secs(10), secs(30));
        assert!(trigger.next_due(Instant::now(), Validity::Infinite).is_none());
    }

    #[test]
    fn test_short_renewal_that_extends_is_not_exhausted() {
        let t0 = Instant::now();
        let expiry = Some(t0 + secs(60));

        // A 60s lease renewed at t=10 with the usual 60s grant.
        assert!(!RefreshTrigger::is_exhausted(expiry, t0 + secs(10), Validity::Finite(secs(60))));
        // Renewed immediately; expiry unchanged.
        assert!(!RefreshTrigger::is_exhausted(expiry, t0, Validity::Finite(secs(60))));
        assert!(!RefreshTrigger::is_exhausted(expiry, t0, Validity::Infinite));
    }

    #[test]
    fn test_capped_renewal_is_exhausted() {
        let t0 = Instant::now();
        let expiry = Some(t0 + secs(60));

        assert!(RefreshTrigger::is_exhausted(expiry, t0 + secs(30), Validity::Finite(secs(15))));
        assert!(RefreshTrigger::is_exhausted(None, t0, Validity::Finite(Duration::ZERO)));
        assert!(!RefreshTrigger::is_exhausted(None, t0, Validity::Finite(secs(5))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// For any finite validity at least as long as the minimum renewal
        /// interval, the next renewal lies within [last_renewed, expiry].
        #[test]
        fn prop_next_due_within_validity(
            min_renewal in 0u64..3_600,
            threshold in 0u64..7_200,
            extra in 0u64..86_400,
            elapsed in 0u64..100_000,
        ) {
            let valid_for = secs(min_renewal + extra);
            let trigger = RefreshTrigger::new(secs(min_renewal), secs(threshold));
            let last_renewed = Instant::now();

            let due = trigger.next_due(last_renewed, Validity::Finite(valid_for)).unwrap();
            prop_assert!(due >= last_renewed);
            prop_assert!(due <= last_renewed + valid_for);

            let now = last_renewed + secs(elapsed);
            let delay = trigger.next_delay(last_renewed, Validity::Finite(valid_for), now).unwrap();
            if now >= due {
                prop_assert_eq!(delay, Duration::ZERO);
            } else {
                prop_assert_eq!(now + delay, due);
            }
        }
    }
}
