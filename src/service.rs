//! `TieredCache`: a hierarchy plus its background maintenance.
//!
//! This is the surface domain callers use. The hot-path methods delegate
//! straight to the [`Hierarchy`]; the background janitor, auto-tuner and
//! optional prefetcher run on the tokio runtime the cache was spawned from
//! and stop deterministically on [`TieredCache::shutdown`].

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::info;

use crate::cache::hierarchy::{new_shared_hierarchy, Hierarchy, SharedHierarchy};
use crate::cache::prefetcher::{AdjacentKeys, PrefetchLoader, Prefetcher};
use crate::cache::stats::CacheStats;
use crate::config::{CacheConfig, ConfigError};
use crate::maintenance::janitor::Janitor;
use crate::maintenance::tuner::AutoTuner;
use crate::maintenance::Maintenance;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("background maintenance needs a Tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// A tiered cache with its background tasks.
pub struct TieredCache<K, V> {
    hierarchy: SharedHierarchy<K, V>,
    maintenance: Mutex<Option<Maintenance>>,
}

impl<K, V> TieredCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// A cache without background tasks. Expired entries are still dropped
    /// lazily on lookup.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            hierarchy: new_shared_hierarchy(config)?,
            maintenance: Mutex::new(None),
        })
    }

    /// A cache whose janitor (and auto-tuner, if enabled) run on the current
    /// Tokio runtime.
    pub fn spawn(config: CacheConfig) -> Result<Self, ServiceError> {
        let runtime = Handle::try_current()?;
        let hierarchy: SharedHierarchy<K, V> = new_shared_hierarchy(config)?;
        let maintenance = Self::base_maintenance(&hierarchy, runtime);
        Ok(Self::started(hierarchy, maintenance))
    }

    /// Like [`TieredCache::spawn`], additionally running the prefetcher with
    /// `loader` when prefetching is enabled.
    pub fn spawn_with_loader(
        config: CacheConfig,
        loader: Arc<dyn PrefetchLoader<K, V>>,
    ) -> Result<Self, ServiceError>
    where
        K: AdjacentKeys,
    {
        let runtime = Handle::try_current()?;
        let hierarchy: SharedHierarchy<K, V> = new_shared_hierarchy(config)?;
        let mut maintenance = Self::base_maintenance(&hierarchy, runtime);

        let prefetch = hierarchy.config().prefetch.clone();
        if prefetch.enabled {
            let interval = prefetch.interval;
            let prefetcher = Prefetcher::new(hierarchy.clone(), loader, prefetch);
            maintenance.schedule(Arc::new(prefetcher), interval);
        }

        Ok(Self::started(hierarchy, maintenance))
    }

    fn base_maintenance(hierarchy: &SharedHierarchy<K, V>, runtime: Handle) -> Maintenance {
        let config = hierarchy.config();
        let mut maintenance = Maintenance::new(runtime);

        let janitor = Janitor::new(hierarchy.clone(), &config.janitor);
        maintenance.schedule(Arc::new(janitor), config.janitor.interval);

        if config.auto_tune.enabled {
            let tuner = AutoTuner::new(hierarchy.clone(), config.auto_tune.clone());
            maintenance.schedule(Arc::new(tuner), config.auto_tune.interval);
        }

        maintenance
    }

    fn started(hierarchy: SharedHierarchy<K, V>, maintenance: Maintenance) -> Self {
        info!(tasks = ?maintenance.task_names(), "Tiered cache started");
        Self {
            hierarchy,
            maintenance: Mutex::new(Some(maintenance)),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.hierarchy.get(key)
    }

    pub fn put(&self, key: K, value: V) {
        self.hierarchy.put(key, value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.hierarchy.contains_key(key)
    }

    pub fn remove(&self, key: &K) {
        self.hierarchy.remove(key)
    }

    pub fn clear(&self) {
        self.hierarchy.clear()
    }

    pub fn stats(&self) -> CacheStats {
        self.hierarchy.stats()
    }

    /// The underlying hierarchy, for inspection.
    pub fn hierarchy(&self) -> &Hierarchy<K, V> {
        &self.hierarchy
    }

    /// Whether background tasks are still attached.
    pub fn is_running(&self) -> bool {
        self.maintenance.lock().is_some()
    }

    /// Stop every background task, wait for them, then release all entries.
    ///
    /// Calls in flight on other threads complete normally. Idempotent.
    pub async fn shutdown(&self) {
        let maintenance = self.maintenance.lock().take();
        if let Some(maintenance) = maintenance {
            maintenance.shutdown().await;
        }
        self.hierarchy.clear();
        info!("Tiered cache shut down");
    }
}
