//! Background maintenance of a tier hierarchy.
//!
//! - [`scheduler`]: cancellable periodic task abstraction
//! - [`janitor`]: TTL sweep and stale access-history pruning
//! - [`tuner`]: hit-rate driven tier capacity tuning

pub mod janitor;
pub mod scheduler;
pub mod tuner;

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::info;

use crate::maintenance::scheduler::{MaintenanceTask, PeriodicTask};

/// The set of periodic tasks attached to one cache, sharing a shutdown flag.
pub struct Maintenance {
    runtime: Handle,
    shutdown: watch::Sender<bool>,
    tasks: Vec<PeriodicTask>,
}

impl Maintenance {
    /// Tasks will be spawned on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            runtime,
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Start running `task` every `period`.
    pub fn schedule(&mut self, task: Arc<dyn MaintenanceTask>, period: Duration) {
        let receiver = self.shutdown.subscribe();
        self.tasks
            .push(PeriodicTask::spawn(&self.runtime, task, period, receiver));
    }

    /// Names of the scheduled tasks, in scheduling order.
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(PeriodicTask::name).collect()
    }

    /// Signal every task to stop and wait until all of them have.
    ///
    /// A pass already in progress completes; no new pass starts.
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);
        let count = self.tasks.len();
        for task in self.tasks.drain(..) {
            task.join().await;
        }
        info!(tasks = count, "Maintenance stopped");
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}
