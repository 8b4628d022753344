//! Background scheduling of delayed renewal tasks.
//!
//! Session managers and lease containers own a [`TaskScheduler`] handle and
//! schedule one task per token or lease. Each task reschedules its successor
//! only after it finished, so work for one entity never overlaps.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::config::SchedulerConfig;
use crate::error::{VaultError, VaultResult};

/// Floor for rescheduling a token or lease after a renewal cycle completed.
pub(crate) const MIN_RESCHEDULE_DELAY: Duration = Duration::from_secs(1);

/// Runs futures after a delay.
pub trait TaskScheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed.
    ///
    /// Dropping or cancelling the returned handle before the delay elapses
    /// prevents the task from starting. A task that already started runs to
    /// completion.
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> ScheduledTask;
}

/// Handle to a task registered with a [`TaskScheduler`].
#[derive(Debug)]
#[must_use = "dropping a ScheduledTask cancels it"]
pub struct ScheduledTask {
    cancel: watch::Sender<bool>,
}

impl ScheduledTask {
    /// Create a handle and the receiver the scheduled future must watch.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (cancel, cancelled) = watch::channel(false);
        (Self { cancel }, cancelled)
    }

    /// Prevent the task from starting if it has not yet.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Wrap `task` so it waits for `delay` unless cancellation arrives first.
///
/// Cancellation is signalled either explicitly or by dropping the handle.
pub async fn run_after(
    delay: Duration,
    mut cancelled: watch::Receiver<bool>,
    task: BoxFuture<'static, ()>,
) {
    // The borrow returned by `wait_for` must be gone before `task` runs.
    let fire = tokio::select! {
        biased;
        _ = async { cancelled.wait_for(|c| *c).await.map(|_| ()) } => false,
        () = tokio::time::sleep(delay) => true,
    };
    if fire {
        task.await;
    } else {
        trace!("Scheduled task cancelled before start");
    }
}

/// [`TaskScheduler`] backed by a tokio runtime.
pub struct TokioScheduler {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl TokioScheduler {
    /// Schedule onto the runtime the caller is running on.
    ///
    /// Under a paused test clock this gives deterministic virtual time.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] when called outside a runtime.
    pub fn current() -> VaultResult<Self> {
        let handle = Handle::try_current()
            .map_err(|e| VaultError::invalid_config(format!("no tokio runtime available: {e}")))?;
        Ok(Self::from_handle(handle))
    }

    /// Schedule onto an existing runtime.
    #[must_use]
    pub const fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: None,
        }
    }

    /// Own a small dedicated worker pool.
    ///
    /// Worker threads are named `{thread_name_prefix}{n}` and never hold up
    /// process exit: dropping the scheduler shuts the pool down in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] if the pool size is zero or the
    /// runtime cannot be started.
    pub fn dedicated(config: &SchedulerConfig) -> VaultResult<Self> {
        if config.pool_size == 0 {
            return Err(VaultError::invalid_config("scheduler pool size must be at least 1"));
        }

        let prefix = config.thread_name_prefix.clone();
        let next_id = Arc::new(AtomicUsize::new(1));
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.pool_size)
            .thread_name_fn(move || {
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                format!("{prefix}{id}")
            })
            .enable_all()
            .build()
            .map_err(|e| VaultError::invalid_config(format!("cannot start scheduler: {e}")))?;

        debug!(
            pool_size = config.pool_size,
            prefix = %config.thread_name_prefix,
            "Started dedicated scheduler"
        );

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }
}

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> ScheduledTask {
        let (handle, cancelled) = ScheduledTask::new();
        self.handle.spawn(run_after(delay, cancelled, task));
        handle
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("dedicated", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}
