//! Cancellable periodic tasks.
//!
//! Each background job runs on its own tokio task, driven by an interval and a
//! shared `watch` shutdown flag. A pass that fails or panics is logged and the
//! schedule carries on; once shutdown is signalled no new pass starts.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, trace, warn};

/// One unit of background work, run once per period.
#[async_trait]
pub trait MaintenanceTask: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Run a single pass.
    async fn run_once(&self) -> anyhow::Result<()>;
}

/// A spawned periodic task.
pub struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `task` on `runtime`, running it every `period` until `shutdown`
    /// turns true or its sender is dropped. The first pass runs one period
    /// after spawning.
    pub fn spawn(
        runtime: &Handle,
        task: Arc<dyn MaintenanceTask>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let name = task.name();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        run_pass(task.as_ref()).await;
                    }
                }
            }

            debug!(task = name, "Periodic task stopped");
        });

        debug!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");
        Self { name, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to stop. Call after signalling shutdown.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                error!(task = self.name, error = %e, "Periodic task terminated abnormally");
            }
        }
    }

    /// Cancel the task at its next await point.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Run one pass, containing errors and panics.
async fn run_pass(task: &dyn MaintenanceTask) {
    let started = Instant::now();
    match AssertUnwindSafe(task.run_once()).catch_unwind().await {
        Ok(Ok(())) => {
            trace!(
                task = task.name(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "Maintenance pass complete"
            );
        }
        Ok(Err(e)) => {
            warn!(task = task.name(), error = %e, "Maintenance pass failed");
        }
        Err(_) => {
            error!(task = task.name(), "Maintenance pass panicked");
        }
    }
}
