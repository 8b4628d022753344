//! Session token management.
//!
//! Two strategies share the [`SessionManager`] trait:
//! [`SimpleSessionManager`] logs in once and keeps the token until it is
//! invalidated, while [`LifecycleAwareSessionManager`] renews the token in the
//! background and falls back to a fresh login when renewal is impossible.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::AuthBackend;
use crate::config::SessionLifecycleConfig;
use crate::error::{VaultError, VaultResult};
use crate::metrics::LifecycleMetrics;
use crate::scheduler::{MIN_RESCHEDULE_DELAY, ScheduledTask, TaskScheduler};
use crate::token::Token;
use crate::trigger::RefreshTrigger;

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token obtained yet
    Uninitialized,
    /// Holding a token that renews on schedule
    Active,
    /// Last renewal cycle failed; the previous token is still served
    Degraded,
    /// Shut down; no further tokens are issued
    Terminated,
}

/// Provides the token used to authenticate Vault requests.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Current token, logging in first if there is none.
    async fn token(&self) -> VaultResult<Arc<Token>>;

    /// Token for background work on behalf of the session.
    ///
    /// Unlike [`token`](Self::token) this never consumes an error left by a
    /// failed renewal cycle; that error stays reserved for the next
    /// application caller while the last good token is still valid.
    async fn current_token(&self) -> VaultResult<Arc<Token>> {
        self.token().await
    }

    /// Forget the current token; the next [`token`](Self::token) logs in again.
    fn invalidate(&self);

    /// Stop renewing and refuse further tokens.
    fn shutdown(&self);

    /// Current state.
    fn state(&self) -> SessionState;
}

/// Pick the session strategy for `config`.
#[must_use]
pub fn create_session_manager(
    config: &SessionLifecycleConfig,
    auth: Arc<dyn AuthBackend>,
    scheduler: Arc<dyn TaskScheduler>,
    metrics: Arc<LifecycleMetrics>,
) -> Arc<dyn SessionManager> {
    if config.enabled {
        Arc::new(LifecycleAwareSessionManager::new(
            auth,
            scheduler,
            config.trigger(),
            metrics,
        ))
    } else {
        Arc::new(SimpleSessionManager::new(auth, metrics))
    }
}

/// Logs in on first use and caches the token without renewing it.
pub struct SimpleSessionManager {
    auth: Arc<dyn AuthBackend>,
    token: ArcSwapOption<Token>,
    login_lock: tokio::sync::Mutex<()>,
    terminated: AtomicBool,
    metrics: Arc<LifecycleMetrics>,
}

impl SimpleSessionManager {
    /// Create a session manager.
    #[must_use]
    pub fn new(auth: Arc<dyn AuthBackend>, metrics: Arc<LifecycleMetrics>) -> Self {
        Self {
            auth,
            token: ArcSwapOption::empty(),
            login_lock: tokio::sync::Mutex::new(()),
            terminated: AtomicBool::new(false),
            metrics,
        }
    }

    fn check_running(&self) -> VaultResult<()> {
        if self.terminated.load(Ordering::SeqCst) {
            Err(VaultError::Shutdown)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionManager for SimpleSessionManager {
    async fn token(&self) -> VaultResult<Arc<Token>> {
        self.check_running()?;
        if let Some(token) = self.token.load_full() {
            return Ok(token);
        }

        let _login = self.login_lock.lock().await;
        self.check_running()?;
        if let Some(token) = self.token.load_full() {
            return Ok(token);
        }

        let token = Arc::new(self.auth.login().await?);
        self.check_running()?;
        self.metrics.logins.inc();
        info!(validity = ?token.validity, "Obtained Vault token");
        self.token.store(Some(Arc::clone(&token)));
        Ok(token)
    }

    fn invalidate(&self) {
        if self.token.swap(None).is_some() {
            info!("Session invalidated");
        }
    }

    fn shutdown(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.token.store(None);
    }

    fn state(&self) -> SessionState {
        if self.terminated.load(Ordering::SeqCst) {
            SessionState::Terminated
        } else if self.token.load().is_some() {
            SessionState::Active
        } else {
            SessionState::Uninitialized
        }
    }
}

/// Keeps the token valid by renewing it ahead of expiry.
///
/// The first [`token`](SessionManager::token) call logs in and schedules a
/// renewal through the [`RefreshTrigger`]. Renewal falls back to a fresh
/// login; when both fail the session turns [`SessionState::Degraded`], the
/// next caller receives the error, and later callers keep getting the last
/// good token until a retry succeeds.
pub struct LifecycleAwareSessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    auth: Arc<dyn AuthBackend>,
    scheduler: Arc<dyn TaskScheduler>,
    trigger: RefreshTrigger,
    token: ArcSwapOption<Token>,
    pending_error: Mutex<Option<VaultError>>,
    renewal: Mutex<Option<ScheduledTask>>,
    login_lock: tokio::sync::Mutex<()>,
    // Bumped on invalidation so in-flight renewals of the old session are discarded.
    generation: AtomicU64,
    degraded: AtomicBool,
    terminated: AtomicBool,
    metrics: Arc<LifecycleMetrics>,
}

impl LifecycleAwareSessionManager {
    /// Create a session manager.
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        scheduler: Arc<dyn TaskScheduler>,
        trigger: RefreshTrigger,
        metrics: Arc<LifecycleMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                auth,
                scheduler,
                trigger,
                token: ArcSwapOption::empty(),
                pending_error: Mutex::new(None),
                renewal: Mutex::new(None),
                login_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                degraded: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                metrics,
            }),
        }
    }

    /// Whether a renewal is currently scheduled.
    #[must_use]
    pub fn has_scheduled_renewal(&self) -> bool {
        self.inner
            .renewal
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_cancelled())
    }
}

#[async_trait]
impl SessionManager for LifecycleAwareSessionManager {
    async fn token(&self) -> VaultResult<Arc<Token>> {
        self.inner.check_running()?;
        if let Some(e) = self.inner.pending_error.lock().take() {
            return Err(e);
        }
        self.inner.token_or_login().await
    }

    async fn current_token(&self) -> VaultResult<Arc<Token>> {
        self.inner.check_running()?;
        self.inner.token_or_login().await
    }

    fn invalidate(&self) {
        let inner = &self.inner;
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.renewal.lock().take();
        inner.degraded.store(false, Ordering::SeqCst);
        if inner.token.swap(None).is_some() {
            info!("Session invalidated");
        }
    }

    fn shutdown(&self) {
        let inner = &self.inner;
        inner.terminated.store(true, Ordering::SeqCst);
        if let Some(task) = inner.renewal.lock().take() {
            task.cancel();
        }
        inner.token.store(None);
        inner.pending_error.lock().take();
        info!("Session shut down");
    }

    fn state(&self) -> SessionState {
        let inner = &self.inner;
        if inner.terminated.load(Ordering::SeqCst) {
            SessionState::Terminated
        } else if inner.token.load().is_none() {
            SessionState::Uninitialized
        } else if inner.degraded.load(Ordering::SeqCst) {
            SessionState::Degraded
        } else {
            SessionState::Active
        }
    }
}

impl SessionInner {
    fn check_running(&self) -> VaultResult<()> {
        if self.terminated.load(Ordering::SeqCst) {
            Err(VaultError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Last good token, unless its validity has fully elapsed.
    fn usable_token(&self) -> Option<Arc<Token>> {
        self.token
            .load_full()
            .filter(|token| !token.is_expired_at(Instant::now()))
    }

    /// Last good token, or a fresh login when it has expired.
    async fn token_or_login(self: &Arc<Self>) -> VaultResult<Arc<Token>> {
        if let Some(token) = self.usable_token() {
            return Ok(token);
        }

        let _login = self.login_lock.lock().await;
        self.check_running()?;
        if let Some(token) = self.usable_token() {
            return Ok(token);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let token = Arc::new(self.auth.login().await?);
        self.check_running()?;
        self.metrics.logins.inc();
        info!(validity = ?token.validity, "Obtained Vault token");
        if self.generation.load(Ordering::SeqCst) == generation {
            self.install(Arc::clone(&token), Duration::ZERO);
        }
        Ok(token)
    }

    /// Serve `token` and schedule its renewal at least `floor` from now.
    fn install(self: &Arc<Self>, token: Arc<Token>, floor: Duration) {
        self.token.store(Some(Arc::clone(&token)));
        self.degraded.store(false, Ordering::SeqCst);

        match self
            .trigger
            .next_delay(token.issued_at, token.validity, Instant::now())
        {
            Some(delay) => self.schedule(delay.max(floor)),
            None => {
                debug!("Token does not expire, renewal not scheduled");
                self.renewal.lock().take();
            }
        }
    }

    fn schedule(self: &Arc<Self>, delay: Duration) {
        let weak = Arc::downgrade(self);
        let task = self.scheduler.schedule(
            delay,
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.renew().await;
                }
            }
            .boxed(),
        );

        let mut slot = self.renewal.lock();
        if self.terminated.load(Ordering::SeqCst) {
            task.cancel();
            return;
        }
        debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Scheduled token renewal"
        );
        *slot = Some(task);
    }

    async fn renew(self: Arc<Self>) {
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }
        let Some(current) = self.token.load_full() else {
            return;
        };
        let generation = self.generation.load(Ordering::SeqCst);

        let outcome = self.refresh(&current).await;

        if self.terminated.load(Ordering::SeqCst)
            || self.generation.load(Ordering::SeqCst) != generation
        {
            debug!("Session changed during renewal, discarding result");
            return;
        }

        match outcome {
            Ok(token) => self.install(Arc::new(token), MIN_RESCHEDULE_DELAY),
            Err(e) => {
                error!(error = %e, "Token renewal and login failed, keeping previous token");
                self.metrics.session_failures.inc();
                self.degraded.store(true, Ordering::SeqCst);
                *self.pending_error.lock() = Some(e);
                self.schedule(self.trigger.min_renewal().max(MIN_RESCHEDULE_DELAY));
            }
        }
    }

    /// Renew `current`, or log in again when that is not possible.
    async fn refresh(&self, current: &Token) -> VaultResult<Token> {
        if current.renewable {
            match self.auth.renew_token(current).await {
                Ok(token)
                    if !RefreshTrigger::is_exhausted(
                        current.expires_at(),
                        token.issued_at,
                        token.validity,
                    ) =>
                {
                    self.metrics.token_renewals.inc();
                    debug!(validity = ?token.validity, "Renewed token");
                    return Ok(token);
                }
                Ok(token) => {
                    debug!(
                        validity = ?token.validity,
                        "Token reached its maximum TTL, logging in again"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Token renewal failed, logging in again");
                }
            }
        } else {
            debug!("Token not renewable, logging in again");
        }

        let token = self.auth.login().await?;
        self.metrics.logins.inc();
        info!(validity = ?token.validity, "Obtained new Vault token");
        Ok(token)
    }
}
