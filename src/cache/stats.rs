//! Hierarchy-wide counters and the statistics snapshot.
//!
//! Counters are relaxed atomics bumped on the hot path. `total_requests` is
//! never stored: it is derived from the snapshot's hits and misses, so
//! `sum(hits_per_tier) + misses == total_requests` holds for every snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::entry::TierLevel;

/// Point-in-time view of the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_requests: u64,
    pub hits_per_tier: [u64; TierLevel::COUNT],
    pub misses: u64,
    /// Entries that left the hierarchy for lack of space.
    pub evictions: u64,
    /// Entries moved to a colder tier to make room.
    pub demotions: u64,
    pub promotions: u64,
    /// Entries dropped for exceeding their tier's TTL.
    pub expirations: u64,
    /// Entries inserted speculatively by the prefetcher.
    pub prefetched: u64,
    pub tier_sizes: [usize; TierLevel::COUNT],
    pub tier_capacities: [usize; TierLevel::COUNT],
    /// Hits in a tier divided by lookups that reached that tier.
    pub hit_rate_per_tier: [f64; TierLevel::COUNT],
}

impl CacheStats {
    pub fn total_hits(&self) -> u64 {
        self.hits_per_tier.iter().sum()
    }

    /// Fraction of all lookups served by any tier.
    pub fn overall_hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_hits() as f64 / self.total_requests as f64
        }
    }
}

/// Lookups that reached a tier and hits it served, as seen by the auto-tuner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounters {
    pub probes: u64,
    pub hits: u64,
}

impl TierCounters {
    /// Counters accumulated since `earlier`.
    pub fn since(&self, earlier: TierCounters) -> TierCounters {
        TierCounters {
            probes: self.probes.saturating_sub(earlier.probes),
            hits: self.hits.saturating_sub(earlier.hits),
        }
    }

    pub fn hit_rate(&self) -> f64 {
        if self.probes == 0 {
            0.0
        } else {
            self.hits as f64 / self.probes as f64
        }
    }
}

/// The live counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    probes: [AtomicU64; TierLevel::COUNT],
    hits: [AtomicU64; TierLevel::COUNT],
    misses: AtomicU64,
    evictions: AtomicU64,
    demotions: AtomicU64,
    promotions: AtomicU64,
    prefetched: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_probe(&self, level: TierLevel) {
        self.probes[level.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self, level: TierLevel) {
        self.hits[level.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_demotion(&self) {
        self.demotions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_prefetch(&self) {
        self.prefetched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn tier_counters(&self, level: TierLevel) -> TierCounters {
        TierCounters {
            probes: self.probes[level.index()].load(Ordering::Relaxed),
            hits: self.hits[level.index()].load(Ordering::Relaxed),
        }
    }

    /// Fill the counter fields of a snapshot. Tier sizes, capacities and
    /// expirations are owned by the tiers and filled in by the hierarchy.
    pub(crate) fn snapshot(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for level in TierLevel::ALL {
            let counters = self.tier_counters(level);
            stats.hits_per_tier[level.index()] = counters.hits;
            stats.hit_rate_per_tier[level.index()] = counters.hit_rate();
        }
        stats.misses = self.misses.load(Ordering::Relaxed);
        stats.total_requests = stats.total_hits() + stats.misses;
        stats.evictions = self.evictions.load(Ordering::Relaxed);
        stats.demotions = self.demotions.load(Ordering::Relaxed);
        stats.promotions = self.promotions.load(Ordering::Relaxed);
        stats.prefetched = self.prefetched.load(Ordering::Relaxed);
        stats
    }
}
