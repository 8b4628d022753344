//! Secret leases and the container keeping them alive.
//!
//! [`SecretLeaseContainer`] tracks every lease obtained through it. Managed
//! leases get one scheduled renewal at a time; when a lease cannot be renewed
//! any further its path is read again and the replacement swapped in.
//! Unmanaged leases are only dropped once their validity elapses.
//! Subscribers observe every change through [`LeaseEvent`]s.

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::{SecretBackend, SecretResponse};
use crate::config::LeaseLifecycleConfig;
use crate::error::{VaultError, VaultResult};
use crate::metrics::LifecycleMetrics;
use crate::scheduler::{MIN_RESCHEDULE_DELAY, ScheduledTask, TaskScheduler};
use crate::token::Validity;
use crate::trigger::RefreshTrigger;

/// A lease on a secret issued by Vault.
#[derive(Clone)]
pub struct Lease {
    /// Lease identifier, unique per registry
    pub lease_id: String,
    /// Path the secret was read from
    pub path: String,
    /// Secret payload
    pub data: serde_json::Value,
    /// When the lease was issued or last renewed
    pub issued_at: Instant,
    /// Validity counted from `issued_at`
    pub validity: Validity,
    /// Whether Vault accepts renewals for this lease
    pub renewable: bool,
}

impl Lease {
    /// Create a lease issued now.
    #[must_use]
    pub fn new(
        lease_id: impl Into<String>,
        path: impl Into<String>,
        data: serde_json::Value,
        validity: Validity,
        renewable: bool,
    ) -> Self {
        Self {
            lease_id: lease_id.into(),
            path: path.into(),
            data,
            issued_at: Instant::now(),
            validity,
            renewable,
        }
    }

    /// The same lease after a renewal granted `validity` from now.
    #[must_use]
    pub fn renewed(&self, validity: Validity, renewable: bool) -> Self {
        Self {
            issued_at: Instant::now(),
            validity,
            renewable,
            ..self.clone()
        }
    }

    /// Instant after which the lease is no longer valid.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.validity.as_duration().map(|d| self.issued_at + d)
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("lease_id", &self.lease_id)
            .field("path", &self.path)
            .field("issued_at", &self.issued_at)
            .field("validity", &self.validity)
            .field("renewable", &self.renewable)
            .finish_non_exhaustive()
    }
}

/// Why a lease left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Revoked through [`SecretLeaseContainer::revoke`]
    Revoked,
    /// Could be neither renewed nor rotated
    Expired,
    /// Dropped locally through [`SecretLeaseContainer::drop_lease`]
    Dropped,
}

/// Change notification for subscribers.
#[derive(Debug, Clone)]
pub enum LeaseEvent {
    /// A lease was added to the registry
    Registered {
        /// Added lease
        lease: Arc<Lease>,
    },
    /// A lease was renewed in place
    Renewed {
        /// Lease with its new validity
        lease: Arc<Lease>,
    },
    /// A lease was replaced by a fresh one for the same path
    Rotated {
        /// Replaced lease, no longer tracked
        previous: Arc<Lease>,
        /// Replacement with new credentials
        current: Arc<Lease>,
    },
    /// A lease left the registry
    Removed {
        /// Removed lease
        lease: Arc<Lease>,
        /// Why it was removed
        reason: RemovalReason,
    },
}

impl LeaseEvent {
    /// The lease the event is about; the replacement for rotations.
    #[must_use]
    pub fn lease(&self) -> &Arc<Lease> {
        match self {
            Self::Registered { lease }
            | Self::Renewed { lease }
            | Self::Removed { lease, .. } => lease,
            Self::Rotated { current, .. } => current,
        }
    }
}

struct LeaseEntry {
    lease: Arc<Lease>,
    managed: bool,
    // Dropping the entry cancels its pending renewal or expiry.
    _task: Option<ScheduledTask>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, LeaseEntry>,
    shut_down: bool,
}

impl Registry {
    /// Entry for `lease` if it is still the registered instance.
    fn current(&self, lease: &Arc<Lease>) -> Option<&LeaseEntry> {
        if self.shut_down {
            return None;
        }
        self.entries
            .get(&lease.lease_id)
            .filter(|entry| Arc::ptr_eq(&entry.lease, lease))
    }
}

struct ContainerInner {
    backend: Arc<dyn SecretBackend>,
    scheduler: Arc<dyn TaskScheduler>,
    config: LeaseLifecycleConfig,
    trigger: RefreshTrigger,
    registry: Mutex<Registry>,
    events: broadcast::Sender<LeaseEvent>,
    metrics: Arc<LifecycleMetrics>,
}

/// Registry of leases with background renewal and rotation.
#[derive(Clone)]
pub struct SecretLeaseContainer {
    inner: Arc<ContainerInner>,
}

impl SecretLeaseContainer {
    /// Create a container.
    #[must_use]
    pub fn new(
        backend: Arc<dyn SecretBackend>,
        scheduler: Arc<dyn TaskScheduler>,
        config: LeaseLifecycleConfig,
        metrics: Arc<LifecycleMetrics>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(ContainerInner {
                backend,
                scheduler,
                trigger: config.trigger(),
                config,
                registry: Mutex::new(Registry::default()),
                events,
                metrics,
            }),
        }
    }

    /// Read `path` and register the lease Vault issued with it, if any.
    ///
    /// # Errors
    ///
    /// Returns the backend error, or [`VaultError::Shutdown`] after
    /// [`shutdown`](Self::shutdown).
    pub async fn read_secret(
        &self,
        path: &str,
    ) -> VaultResult<(serde_json::Value, Option<Arc<Lease>>)> {
        if self.is_shut_down() {
            return Err(VaultError::Shutdown);
        }

        let SecretResponse { data, lease } = self.inner.backend.read(path).await?;
        let lease = lease.map(|lease| self.register(lease)).transpose()?;
        Ok((data, lease))
    }

    /// Track `lease`, scheduling its renewal when it is managed and its
    /// removal at expiry when it is not.
    ///
    /// A lease with an id already tracked replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Shutdown`] after [`shutdown`](Self::shutdown).
    pub fn register(&self, lease: Lease) -> VaultResult<Arc<Lease>> {
        let lease = Arc::new(lease);
        let managed = self.inner.config.manages(&lease.path);
        let task = if managed {
            self.inner.schedule(&lease, Duration::ZERO)
        } else {
            self.inner.schedule_expiry(&lease)
        };

        let mut registry = self.inner.registry.lock();
        if registry.shut_down {
            return Err(VaultError::Shutdown);
        }
        let previous = registry.entries.insert(
            lease.lease_id.clone(),
            LeaseEntry {
                lease: Arc::clone(&lease),
                managed,
                _task: task,
            },
        );
        if previous.is_none() {
            self.inner.metrics.active_leases.inc();
        }
        debug!(lease_id = %lease.lease_id, path = %lease.path, managed, "Registered lease");
        self.inner.emit(LeaseEvent::Registered {
            lease: Arc::clone(&lease),
        });
        Ok(lease)
    }

    /// Revoke a lease at Vault and stop tracking it.
    ///
    /// The lease is removed locally whether or not Vault accepted the
    /// revocation; the backend error, if any, is returned afterwards.
    ///
    /// # Errors
    ///
    /// Returns the backend error, or [`VaultError::Shutdown`] after
    /// [`shutdown`](Self::shutdown).
    pub async fn revoke(&self, lease_id: &str) -> VaultResult<()> {
        if self.is_shut_down() {
            return Err(VaultError::Shutdown);
        }

        let result = self.inner.backend.revoke_lease(lease_id).await;
        if let Err(e) = &result {
            warn!(lease_id, error = %e, "Revoking lease failed, removing it locally");
        }
        self.inner.remove(lease_id, RemovalReason::Revoked);
        result
    }

    /// Stop tracking a lease without contacting Vault.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::LeaseNotFound`] if the lease is not tracked.
    pub fn drop_lease(&self, lease_id: &str) -> VaultResult<Arc<Lease>> {
        self.inner
            .remove(lease_id, RemovalReason::Dropped)
            .ok_or_else(|| VaultError::LeaseNotFound(lease_id.to_string()))
    }

    /// Currently tracked lease with `lease_id`.
    #[must_use]
    pub fn get(&self, lease_id: &str) -> Option<Arc<Lease>> {
        self.inner
            .registry
            .lock()
            .entries
            .get(lease_id)
            .map(|entry| Arc::clone(&entry.lease))
    }

    /// Whether the tracked lease is renewed in the background.
    #[must_use]
    pub fn is_managed(&self, lease_id: &str) -> bool {
        self.inner
            .registry
            .lock()
            .entries
            .get(lease_id)
            .is_some_and(|entry| entry.managed)
    }

    /// Snapshot of all tracked leases.
    #[must_use]
    pub fn leases(&self) -> Vec<Arc<Lease>> {
        self.inner
            .registry
            .lock()
            .entries
            .values()
            .map(|entry| Arc::clone(&entry.lease))
            .collect()
    }

    /// Number of tracked leases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.registry.lock().entries.len()
    }

    /// Whether no lease is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive lease events from now on.
    ///
    /// Slow subscribers lose the oldest events and observe
    /// [`broadcast::error::RecvError::Lagged`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LeaseEvent> {
        self.inner.events.subscribe()
    }

    /// Cancel all renewals, forget all leases, and refuse new ones.
    pub fn shutdown(&self) {
        let entries = {
            let mut registry = self.inner.registry.lock();
            registry.shut_down = true;
            std::mem::take(&mut registry.entries)
        };
        self.inner.metrics.active_leases.set(0);
        info!(leases = entries.len(), "Lease container shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.registry.lock().shut_down
    }
}

impl std::fmt::Debug for SecretLeaseContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretLeaseContainer")
            .field("leases", &self.len())
            .field("trigger", &self.inner.trigger)
            .finish_non_exhaustive()
    }
}

impl ContainerInner {
    fn emit(&self, event: LeaseEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Schedule the next renewal of `lease`, at least `floor` from now;
    /// `None` when it never expires.
    fn schedule(self: &Arc<Self>, lease: &Arc<Lease>, floor: Duration) -> Option<ScheduledTask> {
        let delay = self
            .trigger
            .next_delay(lease.issued_at, lease.validity, Instant::now())?
            .max(floor);
        let weak = Arc::downgrade(self);
        let lease = Arc::clone(lease);

        debug!(
            lease_id = %lease.lease_id,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Scheduled lease renewal"
        );
        Some(self.scheduler.schedule(
            delay,
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.renew(lease).await;
                }
            }
            .boxed(),
        ))
    }

    /// Schedule removal of an unmanaged `lease` once its validity elapses.
    fn schedule_expiry(self: &Arc<Self>, lease: &Arc<Lease>) -> Option<ScheduledTask> {
        let delay = RefreshTrigger::delay_until(lease.expires_at()?, Instant::now());
        let weak = Arc::downgrade(self);
        let lease = Arc::clone(lease);

        Some(self.scheduler.schedule(
            delay,
            async move {
                if let Some(inner) = weak.upgrade() {
                    debug!(lease_id = %lease.lease_id, "Unmanaged lease expired");
                    inner.remove_if_current(&lease, RemovalReason::Expired);
                }
            }
            .boxed(),
        ))
    }

    fn is_current(&self, lease: &Arc<Lease>) -> bool {
        self.registry.lock().current(lease).is_some()
    }

    async fn renew(self: Arc<Self>, lease: Arc<Lease>) {
        if !self.is_current(&lease) {
            return;
        }

        if lease.renewable {
            match self.backend.renew_lease(&lease).await {
                Ok(renewed)
                    if !RefreshTrigger::is_exhausted(
                        lease.expires_at(),
                        renewed.issued_at,
                        renewed.validity,
                    ) =>
                {
                    self.commit_renewal(&lease, renewed);
                    return;
                }
                Ok(renewed) => {
                    warn!(
                        lease_id = %lease.lease_id,
                        validity = ?renewed.validity,
                        "Lease reached its maximum TTL, rotating"
                    );
                }
                Err(e) => {
                    let e = VaultError::LeaseRenewalFailed {
                        lease_id: lease.lease_id.clone(),
                        reason: e.to_string(),
                    };
                    warn!(
                        lease_id = %lease.lease_id,
                        error = %e,
                        "Lease renewal failed, rotating"
                    );
                }
            }
        } else {
            debug!(lease_id = %lease.lease_id, "Lease not renewable, rotating");
        }

        self.rotate(lease).await;
    }

    fn commit_renewal(self: &Arc<Self>, previous: &Arc<Lease>, renewed: Lease) {
        let renewed = Arc::new(renewed);
        let task = self.schedule(&renewed, MIN_RESCHEDULE_DELAY);

        let mut registry = self.registry.lock();
        if registry.current(previous).is_none() {
            debug!(
                lease_id = %previous.lease_id,
                "Lease changed during renewal, discarding result"
            );
            return;
        }
        registry.entries.insert(
            previous.lease_id.clone(),
            LeaseEntry {
                lease: Arc::clone(&renewed),
                managed: true,
                _task: task,
            },
        );
        self.metrics.lease_renewals.inc();
        self.emit(LeaseEvent::Renewed { lease: renewed });
    }

    async fn rotate(self: Arc<Self>, previous: Arc<Lease>) {
        let replacement = match self.backend.read(&previous.path).await {
            Ok(SecretResponse {
                lease: Some(lease), ..
            }) => Ok(lease),
            Ok(SecretResponse { lease: None, .. }) => Err(VaultError::RotationFailed {
                path: previous.path.clone(),
                reason: "no lease issued".to_string(),
            }),
            Err(e) => Err(VaultError::RotationFailed {
                path: previous.path.clone(),
                reason: e.to_string(),
            }),
        };

        match replacement {
            Ok(lease) => self.commit_rotation(&previous, lease),
            Err(e) => {
                error!(
                    lease_id = %previous.lease_id,
                    error = %e,
                    "Lease rotation failed, removing lease"
                );
                self.remove_if_current(&previous, RemovalReason::Expired);
            }
        }
    }

    fn commit_rotation(self: &Arc<Self>, previous: &Arc<Lease>, replacement: Lease) {
        let current = Arc::new(replacement);
        let task = self.schedule(&current, MIN_RESCHEDULE_DELAY);

        let mut registry = self.registry.lock();
        if registry.current(previous).is_none() {
            debug!(
                lease_id = %previous.lease_id,
                "Lease changed during rotation, discarding replacement"
            );
            return;
        }
        registry.entries.remove(&previous.lease_id);
        if registry
            .entries
            .insert(
                current.lease_id.clone(),
                LeaseEntry {
                    lease: Arc::clone(&current),
                    managed: true,
                    _task: task,
                },
            )
            .is_some()
        {
            self.metrics.active_leases.dec();
        }
        self.metrics.lease_rotations.inc();
        info!(
            previous = %previous.lease_id,
            current = %current.lease_id,
            path = %current.path,
            "Rotated lease"
        );
        self.emit(LeaseEvent::Rotated {
            previous: Arc::clone(previous),
            current,
        });
    }

    fn remove_if_current(&self, lease: &Arc<Lease>, reason: RemovalReason) {
        let mut registry = self.registry.lock();
        if registry.current(lease).is_none() {
            return;
        }
        if let Some(entry) = registry.entries.remove(&lease.lease_id) {
            self.removed(entry.lease, reason);
        }
    }

    fn remove(&self, lease_id: &str, reason: RemovalReason) -> Option<Arc<Lease>> {
        let mut registry = self.registry.lock();
        let entry = registry.entries.remove(lease_id)?;
        let lease = Arc::clone(&entry.lease);
        self.removed(entry.lease, reason);
        drop(registry);
        Some(lease)
    }

    /// Book-keeping for a removed entry; called with the registry locked.
    fn removed(&self, lease: Arc<Lease>, reason: RemovalReason) {
        self.metrics.lease_removals.inc();
        self.metrics.active_leases.dec();
        debug!(lease_id = %lease.lease_id, ?reason, "Removed lease");
        self.emit(LeaseEvent::Removed { lease, reason });
    }
}
