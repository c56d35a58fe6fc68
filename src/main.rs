//! tiercache soak driver.
//!
//! Runs a skewed get-or-compute workload over a grid of `(x, z)` keys against
//! a tiered cache with its background tasks live, then prints the final
//! statistics (and optionally the Prometheus exposition).

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::info;

use tiercache::config::{CacheConfig, Cli};
use tiercache::metrics::CacheMetrics;
use tiercache::{FnLoader, TieredCache};

type GridKey = (i32, i32);

/// Stand-in for the expensive computation a real caller guards.
fn compute(key: &GridKey) -> u64 {
    let (x, z) = *key;
    let mut h = (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (z as u64);
    for _ in 0..64 {
        h = h.rotate_left(13).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    }
    h
}

/// 80% of lookups fall in a small hot region, the rest anywhere on the grid.
fn sample_key(key_space: i32) -> GridKey {
    let hot_span = (key_space / 16).max(1);
    if fastrand::f64() < 0.8 {
        (fastrand::i32(0..hot_span), fastrand::i32(0..hot_span))
    } else {
        (fastrand::i32(0..key_space), fastrand::i32(0..key_space))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "tiercache=debug"
    } else {
        "tiercache=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("tiercache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = CacheConfig::load(&cli.config)?;
    if cli.prefetch {
        config.prefetch.enabled = true;
    }

    info!(
        hot = config.tiers.hot.capacity,
        warm = config.tiers.warm.capacity,
        cold = config.tiers.cold.capacity,
        auto_tune = config.auto_tune.enabled,
        prefetch = config.prefetch.enabled,
        "Tier capacities"
    );

    let loader = Arc::new(FnLoader(|key: &GridKey| Some(compute(key))));
    let cache: Arc<TieredCache<GridKey, u64>> =
        Arc::new(TieredCache::spawn_with_loader(config, loader)?);

    let key_space = cli.key_space.max(1);
    let deadline = Instant::now() + Duration::from_secs(cli.duration_secs);
    info!(
        workers = cli.workers,
        key_space,
        duration_secs = cli.duration_secs,
        "Starting workload"
    );

    let workers: Vec<_> = (0..cli.workers.max(1))
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let mut ops = 0u64;
                while Instant::now() < deadline {
                    let key = sample_key(key_space);
                    if cache.get(&key).is_none() {
                        cache.put(key, compute(&key));
                    }
                    ops += 1;
                    if ops % 64 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                ops
            })
        })
        .collect();

    let mut total_ops = 0u64;
    for worker in workers {
        total_ops += worker.await?;
    }

    let stats = cache.stats();
    info!(
        total_ops,
        hit_rate = stats.overall_hit_rate(),
        promotions = stats.promotions,
        evictions = stats.evictions,
        "Workload finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if cli.metrics {
        let metrics = CacheMetrics::new()?;
        metrics.observe(&stats);
        print!("{}", metrics.render()?);
    }

    cache.shutdown().await;
    Ok(())
}
