//! Runtime configuration for tiercache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All tier-related knobs (capacities, TTLs, migration thresholds, maintenance
//! schedules) live here. Every constructor in the crate validates its config,
//! so an invalid capacity or TTL is rejected before any cache exists.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::entry::TierLevel;

/// Command-line arguments for the soak driver.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiercache", about = "Drive a tiered cache with a synthetic workload and report its statistics")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "tiercache.json")]
    pub config: PathBuf,

    /// How long to run the workload, in seconds.
    #[arg(short, long, default_value_t = 10)]
    pub duration_secs: u64,

    /// Number of concurrent worker tasks issuing get/put.
    #[arg(short, long, default_value_t = 8)]
    pub workers: usize,

    /// Side length of the square key grid the workload samples from.
    #[arg(long, default_value_t = 256)]
    pub key_space: i32,

    /// Enable speculative prefetch of adjacent grid keys.
    #[arg(long)]
    pub prefetch: bool,

    /// Print Prometheus text exposition after the run.
    #[arg(long)]
    pub metrics: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Configuration errors. These are the only failures the cache can produce.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{tier} tier: capacity bounds must satisfy 0 < min ({min}) <= capacity ({capacity}) <= max ({max})")]
    InvalidCapacity {
        tier: TierLevel,
        min: usize,
        capacity: usize,
        max: usize,
    },

    #[error("{0} tier: ttl must be greater than zero")]
    InvalidTtl(TierLevel),

    #[error("{0} interval must be greater than zero")]
    InvalidInterval(&'static str),

    #[error("{name} must be within [0, 1], got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("auto-tune step fraction must be within (0, 1], got {0}")]
    InvalidStep(f64),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Per-tier capacity and TTL.
    pub tiers: TiersConfig,

    /// Promotion thresholds.
    pub migration: MigrationConfig,

    /// Expiry sweep settings.
    pub janitor: JanitorConfig,

    /// Capacity auto-tuning settings.
    pub auto_tune: AutoTuneConfig,

    /// Speculative prefetch settings.
    pub prefetch: PrefetchConfig,
}

/// Capacity bounds and TTL of a single tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Floor the auto-tuner never shrinks below.
    pub min_capacity: usize,

    /// Initial capacity in entries.
    pub capacity: usize,

    /// Ceiling the auto-tuner never grows above.
    pub max_capacity: usize,

    /// Maximum entry age before it is treated as absent.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl TierConfig {
    /// A tier with fixed capacity (no room for auto-tuning).
    pub fn fixed(capacity: usize, ttl: Duration) -> Self {
        Self {
            min_capacity: capacity,
            capacity,
            max_capacity: capacity,
            ttl,
        }
    }
}

/// The three tiers, hottest first.
///
/// A tier section may set any subset of its fields; the rest keep that tier's
/// defaults. Overriding only `capacity` widens the default bounds to contain it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "TiersOverrides")]
pub struct TiersConfig {
    pub hot: TierConfig,
    pub warm: TierConfig,
    pub cold: TierConfig,
}

impl TiersConfig {
    /// Configuration of the tier at `level`.
    pub fn get(&self, level: TierLevel) -> &TierConfig {
        match level {
            TierLevel::Hot => &self.hot,
            TierLevel::Warm => &self.warm,
            TierLevel::Cold => &self.cold,
        }
    }
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            hot: TierConfig {
                min_capacity: 256,
                capacity: 1_000,
                max_capacity: 4_096,
                ttl: Duration::from_secs(30),
            },
            warm: TierConfig {
                min_capacity: 2_000,
                capacity: 10_000,
                max_capacity: 40_000,
                ttl: Duration::from_secs(5 * 60),
            },
            cold: TierConfig {
                min_capacity: 20_000,
                capacity: 100_000,
                max_capacity: 400_000,
                ttl: Duration::from_secs(30 * 60),
            },
        }
    }
}

/// A tier section as written in the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TierOverrides {
    min_capacity: Option<usize>,
    capacity: Option<usize>,
    max_capacity: Option<usize>,
    #[serde(with = "humantime_serde")]
    ttl: Option<Duration>,
}

impl TierOverrides {
    fn apply(self, defaults: TierConfig) -> TierConfig {
        let capacity = self.capacity.unwrap_or(defaults.capacity);
        TierConfig {
            min_capacity: self
                .min_capacity
                .unwrap_or_else(|| defaults.min_capacity.min(capacity)),
            capacity,
            max_capacity: self
                .max_capacity
                .unwrap_or_else(|| defaults.max_capacity.max(capacity)),
            ttl: self.ttl.unwrap_or(defaults.ttl),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TiersOverrides {
    hot: TierOverrides,
    warm: TierOverrides,
    cold: TierOverrides,
}

impl From<TiersOverrides> for TiersConfig {
    fn from(overrides: TiersOverrides) -> Self {
        let defaults = TiersConfig::default();
        Self {
            hot: overrides.hot.apply(defaults.hot),
            warm: overrides.warm.apply(defaults.warm),
            cold: overrides.cold.apply(defaults.cold),
        }
    }
}

/// Thresholds used by the migration policy.
///
/// A key belongs in the hot tier once its frequency exceeds
/// `hot_min_frequency` and its previous access was within `hot_recency`; the
/// warm tier uses the second pair; everything else lives in the cold tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub hot_min_frequency: u64,

    #[serde(with = "humantime_serde")]
    pub hot_recency: Duration,

    pub warm_min_frequency: u64,

    #[serde(with = "humantime_serde")]
    pub warm_recency: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            hot_min_frequency: 10,
            hot_recency: Duration::from_secs(60),
            warm_min_frequency: 2,
            warm_recency: Duration::from_secs(300),
        }
    }
}

/// Expiry sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// Period between sweeps.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Idle time after which the access history of a non-resident key is dropped.
    #[serde(with = "humantime_serde")]
    pub access_staleness: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            access_staleness: Duration::from_secs(60 * 60),
        }
    }
}

/// Capacity auto-tuning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoTuneConfig {
    pub enabled: bool,

    /// Period between tuning passes. Each pass measures a fresh window.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// One step, as a fraction of the current capacity (at least one entry).
    pub step_fraction: f64,

    /// Grow a tier whose windowed hit rate exceeds this.
    pub expand_threshold: f64,

    /// Shrink a tier whose windowed hit rate falls below this.
    pub shrink_threshold: f64,

    /// Windows with fewer probes than this are ignored.
    pub min_samples: u64,
}

impl Default for AutoTuneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            step_fraction: 0.10,
            expand_threshold: 0.80,
            shrink_threshold: 0.05,
            min_samples: 100,
        }
    }
}

/// Speculative prefetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Minimum access frequency for a key to seed prefetching.
    pub min_frequency: u64,

    /// Only keys accessed within this window seed prefetching.
    #[serde(with = "humantime_serde")]
    pub hot_window: Duration,

    /// Number of seed keys considered per pass.
    pub max_hot_keys: usize,

    /// Upper bound on loader calls per pass.
    pub max_loads_per_pass: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(5),
            min_frequency: 5,
            hot_window: Duration::from_secs(30),
            max_hot_keys: 32,
            max_loads_per_pass: 128,
        }
    }
}

impl CacheConfig {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: CacheConfig = serde_json::from_str(&data)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(CacheConfig::default())
        }
    }

    /// Check every bound the cache relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for level in TierLevel::ALL {
            let tier = self.tiers.get(level);
            if tier.min_capacity == 0
                || tier.min_capacity > tier.capacity
                || tier.capacity > tier.max_capacity
            {
                return Err(ConfigError::InvalidCapacity {
                    tier: level,
                    min: tier.min_capacity,
                    capacity: tier.capacity,
                    max: tier.max_capacity,
                });
            }
            if tier.ttl.is_zero() {
                return Err(ConfigError::InvalidTtl(level));
            }
        }

        if self.janitor.interval.is_zero() {
            return Err(ConfigError::InvalidInterval("janitor"));
        }
        if self.auto_tune.interval.is_zero() {
            return Err(ConfigError::InvalidInterval("auto-tune"));
        }
        if self.prefetch.interval.is_zero() {
            return Err(ConfigError::InvalidInterval("prefetch"));
        }

        let step = self.auto_tune.step_fraction;
        if !(step > 0.0 && step <= 1.0) {
            return Err(ConfigError::InvalidStep(step));
        }
        for (name, value) in [
            ("expand_threshold", self.auto_tune.expand_threshold),
            ("shrink_threshold", self.auto_tune.shrink_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        Ok(())
    }
}
