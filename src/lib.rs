//! tiercache: an embeddable tiered in-memory cache.
//!
//! Guards expensive computations behind three capacity- and TTL-bounded tiers:
//!   hot (small, short-lived) → warm → cold (large, long-lived)
//!
//! Keys migrate between tiers by access frequency and recency; a background
//! janitor reclaims expired entries and an auto-tuner resizes tiers from their
//! observed hit rates. Callers compute values themselves: the cache never
//! runs a computation on the lookup path.

pub mod cache;
pub mod config;
pub mod maintenance;
pub mod metrics;
pub mod service;

pub use cache::entry::TierLevel;
pub use cache::prefetcher::{AdjacentKeys, FnLoader, PrefetchLoader};
pub use cache::stats::CacheStats;
pub use config::{CacheConfig, ConfigError};
pub use service::{ServiceError, TieredCache};
