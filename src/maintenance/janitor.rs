//! Janitor: periodic sweep of expired entries and stale access history.
//!
//! Lookups already drop expired entries lazily; the janitor reclaims the ones
//! nobody reads again. A lookup racing the sweep may still return an entry
//! that the sweep was about to expire.

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::hierarchy::SharedHierarchy;
use crate::config::JanitorConfig;
use crate::maintenance::scheduler::MaintenanceTask;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries dropped for exceeding their tier's TTL.
    pub expired: usize,
    /// Access histories dropped for non-resident, idle keys.
    pub pruned: usize,
}

#[derive(Clone)]
pub struct Janitor<K, V> {
    hierarchy: SharedHierarchy<K, V>,
    access_staleness: Duration,
}

impl<K, V> Janitor<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(hierarchy: SharedHierarchy<K, V>, config: &JanitorConfig) -> Self {
        Self {
            hierarchy,
            access_staleness: config.access_staleness,
        }
    }

    /// Run one sweep over every tier and the access tracker.
    pub fn sweep(&self) -> SweepReport {
        let expired = self.hierarchy.purge_expired();
        let pruned = self.hierarchy.prune_access_stats(self.access_staleness);
        SweepReport { expired, pruned }
    }
}

#[async_trait]
impl<K, V> MaintenanceTask for Janitor<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "janitor"
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        // A sweep walks every resident entry; keep it off the async workers.
        let janitor = self.clone();
        let report = tokio::task::spawn_blocking(move || janitor.sweep()).await?;
        if report.expired > 0 || report.pruned > 0 {
            debug!(
                expired = report.expired,
                pruned = report.pruned,
                "Janitor sweep complete"
            );
        }
        Ok(())
    }
}
