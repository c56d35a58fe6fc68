//! Auto-tuner: resizes tiers from windowed hit rates.
//!
//! Each pass looks only at the probes and hits accumulated since the previous
//! pass, so windows never overlap. A tier changes by at most one step per
//! pass, and never leaves its configured `[min_capacity, max_capacity]` range.

use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::cache::entry::TierLevel;
use crate::cache::hierarchy::SharedHierarchy;
use crate::cache::stats::TierCounters;
use crate::config::AutoTuneConfig;
use crate::maintenance::scheduler::MaintenanceTask;

/// A capacity change applied by one tuning pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityChange {
    pub level: TierLevel,
    pub from: usize,
    pub to: usize,
    /// Hit rate measured over the window that triggered the change.
    pub hit_rate: f64,
}

#[derive(Clone)]
pub struct AutoTuner<K, V> {
    hierarchy: SharedHierarchy<K, V>,
    config: AutoTuneConfig,
    /// Counters at the end of the previous window, per tier.
    marks: Arc<Mutex<[TierCounters; TierLevel::COUNT]>>,
}

impl<K, V> AutoTuner<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// The first window starts now.
    pub fn new(hierarchy: SharedHierarchy<K, V>, config: AutoTuneConfig) -> Self {
        let marks = TierLevel::ALL.map(|level| hierarchy.tier_counters(level));
        Self {
            hierarchy,
            config,
            marks: Arc::new(Mutex::new(marks)),
        }
    }

    /// Close the current window and apply at most one step per tier.
    pub fn tune(&self) -> Vec<CapacityChange> {
        let mut marks = self.marks.lock();
        let mut changes = Vec::new();

        for level in TierLevel::ALL {
            let counters = self.hierarchy.tier_counters(level);
            let window = counters.since(marks[level.index()]);
            marks[level.index()] = counters;

            if window.probes < self.config.min_samples {
                continue;
            }

            let hit_rate = window.hit_rate();
            let capacity = self.hierarchy.tier(level).capacity();
            let Some(target) = self.target_capacity(level, capacity, hit_rate) else {
                continue;
            };
            let Some(new_capacity) = NonZeroUsize::new(target) else {
                continue;
            };

            let moved = self.hierarchy.resize_tier(level, new_capacity);
            info!(
                tier = %level,
                from = capacity,
                to = target,
                hit_rate,
                moved,
                "Tier capacity tuned"
            );
            changes.push(CapacityChange {
                level,
                from: capacity,
                to: target,
                hit_rate,
            });
        }

        changes
    }

    /// Capacity one step away from `capacity` that `hit_rate` calls for, if any.
    fn target_capacity(&self, level: TierLevel, capacity: usize, hit_rate: f64) -> Option<usize> {
        let bounds = self.hierarchy.config().tiers.get(level);
        let step = ((capacity as f64 * self.config.step_fraction).ceil() as usize).max(1);

        if hit_rate > self.config.expand_threshold && capacity < bounds.max_capacity {
            Some(capacity.saturating_add(step).min(bounds.max_capacity))
        } else if hit_rate < self.config.shrink_threshold && capacity > bounds.min_capacity {
            Some(capacity.saturating_sub(step).max(bounds.min_capacity))
        } else {
            None
        }
    }
}

#[async_trait]
impl<K, V> MaintenanceTask for AutoTuner<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "auto-tuner"
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        // Shrinking can cascade thousands of demotions; keep it off the async workers.
        let tuner = self.clone();
        tokio::task::spawn_blocking(move || tuner.tune()).await?;
        Ok(())
    }
}
