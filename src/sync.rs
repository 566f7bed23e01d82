//! Background sync daemon.
//!
//! Runs a caller-supplied job against the distributed tier on a fixed
//! interval, outside the request path. Job failures are logged and the
//! daemon keeps ticking.

use crate::error::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A periodic job run against a handle to the distributed tier.
///
/// Implemented for any `Fn(S) -> impl Future<Output = Result<()>>` closure.
pub trait SyncJob<S>: Send + Sync + 'static {
    fn run(&self, store: S) -> BoxFuture<'static, Result<()>>;
}

impl<S, F, Fut> SyncJob<S> for F
where
    F: Fn(S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn run(&self, store: S) -> BoxFuture<'static, Result<()>> {
        (self)(store).boxed()
    }
}

/// Handle to a running daemon.
///
/// Dropping the handle stops the daemon after its current run.
pub struct SyncHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    runs: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl SyncHandle {
    /// Completed job runs, successful or not.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Job runs that returned an error.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the daemon and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            error!("Sync daemon task ended abnormally: {}", e);
        }
    }
}

/// Spawn a daemon running `job` every `interval` on the current tokio runtime.
///
/// The first run happens one `interval` after the call. A run that overlaps
/// the next tick delays later ticks rather than bursting.
///
/// # Errors
/// Returns `Error::ConfigError` for a zero interval.
///
/// # Panics
/// Panics if called outside a tokio runtime.
pub fn start_periodic_sync<S, J>(interval: Duration, store: S, job: J) -> Result<SyncHandle>
where
    S: Clone + Send + Sync + 'static,
    J: SyncJob<S>,
{
    if interval.is_zero() {
        return Err(Error::ConfigError(
            "sync interval must be non-zero".to_string(),
        ));
    }

    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let runs = Arc::new(AtomicU64::new(0));
    let failures = Arc::new(AtomicU64::new(0));
    let task_runs = Arc::clone(&runs);
    let task_failures = Arc::clone(&failures);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Sync daemon started (interval: {:?})", interval);

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    if let Err(e) = job.run(store.clone()).await {
                        task_failures.fetch_add(1, Ordering::SeqCst);
                        error!("Periodic sync failed: {}", e);
                    }
                    task_runs.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        info!("Sync daemon stopped");
    });

    Ok(SyncHandle {
        stop: Some(stop_tx),
        task,
        runs,
        failures,
    })
}
