//! Integration tests for the background tasks of a spawned cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;

use tiercache::cache::entry::TierLevel;
use tiercache::config::{CacheConfig, TierConfig};
use tiercache::maintenance::scheduler::MaintenanceTask;
use tiercache::maintenance::Maintenance;
use tiercache::{FnLoader, TieredCache};

fn quiet_config() -> CacheConfig {
    let mut config = CacheConfig::default();
    config.janitor.interval = Duration::from_millis(20);
    config.auto_tune.enabled = false;
    config
}

#[tokio::test]
async fn test_janitor_purges_unread_expired_entries() {
    let mut config = quiet_config();
    let ttl = Duration::from_millis(30);
    config.tiers.hot = TierConfig::fixed(16, ttl);
    config.tiers.warm = TierConfig::fixed(16, ttl);
    config.tiers.cold = TierConfig::fixed(16, ttl);

    let cache: TieredCache<u32, u32> = TieredCache::spawn(config).unwrap();
    for k in 0..10 {
        cache.put(k, k);
    }
    assert_eq!(cache.stats().tier_sizes.iter().sum::<usize>(), 10);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = cache.stats();
    assert_eq!(stats.tier_sizes, [0, 0, 0]);
    assert_eq!(stats.expirations, 10);
    // Nothing was looked up, so the lazy path cannot have done this.
    assert_eq!(stats.total_requests, 0);

    cache.shutdown().await;
}

#[tokio::test]
async fn test_auto_tuner_grows_busy_hot_tier() {
    let mut config = quiet_config();
    config.migration.hot_min_frequency = 0;
    config.tiers.hot = TierConfig {
        min_capacity: 2,
        capacity: 4,
        max_capacity: 8,
        ttl: Duration::from_secs(60),
    };
    config.auto_tune.enabled = true;
    config.auto_tune.interval = Duration::from_millis(30);
    config.auto_tune.min_samples = 10;

    let cache: TieredCache<u32, u32> = TieredCache::spawn(config).unwrap();
    for k in 0..4 {
        cache.put(k, k);
    }

    // Every lookup is served by the hot tier: hit rate 1.0 in each window.
    for _ in 0..10 {
        for _ in 0..20 {
            for k in 0..4 {
                assert_eq!(cache.get(&k), Some(k));
            }
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
    }

    let stats = cache.stats();
    let hot = stats.tier_capacities[TierLevel::Hot.index()];
    assert!(hot > 4, "hot capacity should have grown, got {hot}");
    assert!(hot <= 8);
    // Untouched tiers saw no samples and keep their capacity.
    assert_eq!(
        stats.tier_capacities[TierLevel::Cold.index()],
        CacheConfig::default().tiers.cold.capacity
    );

    cache.shutdown().await;
}

#[tokio::test]
async fn test_prefetcher_loads_neighbours_of_hot_keys() {
    let mut config = quiet_config();
    config.prefetch.enabled = true;
    config.prefetch.interval = Duration::from_millis(20);
    config.prefetch.min_frequency = 3;

    let loader = Arc::new(FnLoader(|key: &(i32, i32)| Some(key.0 * 100 + key.1)));
    let cache: TieredCache<(i32, i32), i32> =
        TieredCache::spawn_with_loader(config, loader).unwrap();

    cache.put((10, 10), 0);
    for _ in 0..5 {
        cache.get(&(10, 10));
    }

    tokio::time::sleep(Duration::from_millis(150)).await;

    for key in [(9, 10), (11, 10), (10, 9), (10, 11)] {
        assert_eq!(cache.hierarchy().tier_of(&key), Some(TierLevel::Cold));
    }
    assert_eq!(cache.stats().prefetched, 4);
    assert_eq!(cache.get(&(11, 10)), Some(1110));

    cache.shutdown().await;
}

#[tokio::test]
async fn test_prefetch_disabled_by_default() {
    let loader = Arc::new(FnLoader(|_: &(i32, i32)| Some(0)));
    let cache: TieredCache<(i32, i32), i32> =
        TieredCache::spawn_with_loader(quiet_config(), loader).unwrap();

    cache.put((0, 0), 0);
    for _ in 0..10 {
        cache.get(&(0, 0));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(cache.stats().prefetched, 0);
    assert!(!cache.contains_key(&(1, 0)));

    cache.shutdown().await;
}

struct CountingTask {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl MaintenanceTask for CountingTask {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_shutdown_stops_every_task() {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut maintenance = Maintenance::new(Handle::current());
    for _ in 0..3 {
        maintenance.schedule(
            Arc::new(CountingTask { runs: runs.clone() }),
            Duration::from_millis(10),
        );
    }
    assert_eq!(maintenance.task_names(), vec!["counting"; 3]);

    tokio::time::sleep(Duration::from_millis(60)).await;
    maintenance.shutdown().await;

    let after_shutdown = runs.load(Ordering::SeqCst);
    assert!(after_shutdown > 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runs.load(Ordering::SeqCst), after_shutdown);
}

#[tokio::test]
async fn test_cache_usable_while_tasks_run() {
    let cache: Arc<TieredCache<u64, u64>> =
        Arc::new(TieredCache::spawn(quiet_config()).unwrap());

    let mut handles = Vec::new();
    for worker in 0..4u64 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..500u64 {
                let key = (worker * 1_000) + (i % 50);
                if cache.get(&key).is_none() {
                    cache.put(key, key * 2);
                }
                if i % 32 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.total_requests, 2_000);
    assert_eq!(stats.total_hits() + stats.misses, stats.total_requests);
    assert_eq!(cache.get(&1_007), Some(2_014));

    cache.shutdown().await;
    assert!(!cache.is_running());
}
