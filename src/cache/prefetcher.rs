//! Prefetching: speculative loads of keys adjacent to hot keys.
//!
//! Strategy:
//! 1. Take the most frequently hit keys accessed within the hot window
//! 2. Expand each into its structural neighbours (grid coordinates)
//! 3. Load neighbours resident in no tier through the injected loader
//!
//! Loaded values always enter the coldest tier and carry no access history,
//! so an unconfirmed guess never displaces data that has proven useful.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::hierarchy::SharedHierarchy;
use crate::config::PrefetchConfig;
use crate::maintenance::scheduler::MaintenanceTask;

/// Keys with a spatial structure whose neighbours are likely to be requested next.
pub trait AdjacentKeys: Sized {
    /// Neighbouring keys, one step along each axis. Unstructured keys return none.
    fn adjacent_keys(&self) -> Vec<Self>;
}

impl AdjacentKeys for (i32, i32) {
    fn adjacent_keys(&self) -> Vec<Self> {
        let (x, y) = *self;
        [
            x.checked_sub(1).map(|x| (x, y)),
            x.checked_add(1).map(|x| (x, y)),
            y.checked_sub(1).map(|y| (x, y)),
            y.checked_add(1).map(|y| (x, y)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl AdjacentKeys for (i32, i32, i32) {
    fn adjacent_keys(&self) -> Vec<Self> {
        let (x, y, z) = *self;
        [
            x.checked_sub(1).map(|x| (x, y, z)),
            x.checked_add(1).map(|x| (x, y, z)),
            y.checked_sub(1).map(|y| (x, y, z)),
            y.checked_add(1).map(|y| (x, y, z)),
            z.checked_sub(1).map(|z| (x, y, z)),
            z.checked_add(1).map(|z| (x, y, z)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Colon-separated keys such as `"chunk:12:-4"`: every integer segment is an axis.
impl AdjacentKeys for String {
    fn adjacent_keys(&self) -> Vec<Self> {
        let segments: Vec<&str> = self.split(':').collect();
        let mut neighbours = Vec::new();

        for (axis, segment) in segments.iter().enumerate() {
            let Ok(value) = segment.parse::<i64>() else {
                continue;
            };
            for moved in [value.checked_sub(1), value.checked_add(1)].into_iter().flatten() {
                let moved = moved.to_string();
                let parts: Vec<&str> = segments
                    .iter()
                    .enumerate()
                    .map(|(i, part)| if i == axis { moved.as_str() } else { *part })
                    .collect();
                neighbours.push(parts.join(":"));
            }
        }

        neighbours
    }
}

/// Source of speculative values.
#[async_trait]
pub trait PrefetchLoader<K, V>: Send + Sync {
    /// Compute the value for `key`, or `None` if it does not exist.
    async fn load(&self, key: &K) -> anyhow::Result<Option<V>>;
}

/// Adapts a synchronous function into a [`PrefetchLoader`].
pub struct FnLoader<F>(pub F);

#[async_trait]
impl<K, V, F> PrefetchLoader<K, V> for FnLoader<F>
where
    K: Send + Sync + 'static,
    V: Send + 'static,
    F: Fn(&K) -> Option<V> + Send + Sync,
{
    async fn load(&self, key: &K) -> anyhow::Result<Option<V>> {
        Ok((self.0)(key))
    }
}

/// Outcome of one prefetch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Neighbours the loader was asked for.
    pub requested: usize,
    /// Values inserted into the cold tier.
    pub inserted: usize,
    /// Loads that returned an error.
    pub failed: usize,
}

/// The prefetcher decides which keys to load speculatively.
pub struct Prefetcher<K, V> {
    hierarchy: SharedHierarchy<K, V>,
    loader: Arc<dyn PrefetchLoader<K, V>>,
    config: PrefetchConfig,
}

impl<K, V> Prefetcher<K, V>
where
    K: Eq + Hash + Clone + Debug + AdjacentKeys + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        hierarchy: SharedHierarchy<K, V>,
        loader: Arc<dyn PrefetchLoader<K, V>>,
        config: PrefetchConfig,
    ) -> Self {
        Self {
            hierarchy,
            loader,
            config,
        }
    }

    /// Neighbours of hot keys that no tier holds, hottest seeds first.
    pub fn candidates(&self) -> Vec<K> {
        let hot = self.hierarchy.tracker().hottest(
            self.config.max_hot_keys,
            self.config.min_frequency,
            self.config.hot_window,
            Instant::now(),
        );

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (key, _) in hot {
            for neighbour in key.adjacent_keys() {
                if candidates.len() >= self.config.max_loads_per_pass {
                    return candidates;
                }
                if !self.hierarchy.contains_key(&neighbour) && seen.insert(neighbour.clone()) {
                    candidates.push(neighbour);
                }
            }
        }
        candidates
    }

    /// Run one prefetch pass.
    pub async fn prefetch(&self) -> PrefetchReport {
        let mut report = PrefetchReport::default();

        for key in self.candidates() {
            report.requested += 1;
            match self.loader.load(&key).await {
                Ok(Some(value)) => {
                    if self.hierarchy.put_speculative(key, value) {
                        report.inserted += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(?key, error = %e, "Prefetch load failed");
                }
            }
        }

        report
    }
}

#[async_trait]
impl<K, V> MaintenanceTask for Prefetcher<K, V>
where
    K: Eq + Hash + Clone + Debug + AdjacentKeys + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "prefetcher"
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        let report = self.prefetch().await;
        if report.requested > 0 {
            debug!(
                requested = report.requested,
                inserted = report.inserted,
                failed = report.failed,
                "Prefetch pass complete"
            );
        }
        Ok(())
    }
}
