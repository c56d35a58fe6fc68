//! Cache entry and tier level types.
//!
//! An entry is the unit of movement between tiers: it is promoted, demoted and
//! expired as a whole, and carries its insertion time with it so the TTL bounds
//! the age of the value no matter which tier currently holds it.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Identifies one of the three tiers of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TierLevel {
    /// Tier 1: small, short-lived, frequently hit keys.
    Hot,
    /// Tier 2: keys with some reuse.
    Warm,
    /// Tier 3: everything else, including speculative loads.
    Cold,
}

impl TierLevel {
    /// All levels, hottest first. This is the probe order of a lookup.
    pub const ALL: [TierLevel; 3] = [TierLevel::Hot, TierLevel::Warm, TierLevel::Cold];

    /// Number of tiers in the hierarchy.
    pub const COUNT: usize = 3;

    /// Zero-based position (0 = hottest), used to index per-tier arrays.
    pub fn index(&self) -> usize {
        match self {
            TierLevel::Hot => 0,
            TierLevel::Warm => 1,
            TierLevel::Cold => 2,
        }
    }

    /// Returns the next colder tier for demotion, or None if already coldest.
    pub fn colder(&self) -> Option<TierLevel> {
        match self {
            TierLevel::Hot => Some(TierLevel::Warm),
            TierLevel::Warm => Some(TierLevel::Cold),
            TierLevel::Cold => None,
        }
    }

    /// Returns the next hotter tier, or None if already hottest.
    pub fn hotter(&self) -> Option<TierLevel> {
        match self {
            TierLevel::Hot => None,
            TierLevel::Warm => Some(TierLevel::Hot),
            TierLevel::Cold => Some(TierLevel::Warm),
        }
    }

    /// Whether `self` sits strictly above `other` in the hierarchy.
    pub fn is_hotter_than(&self, other: TierLevel) -> bool {
        self.index() < other.index()
    }
}

impl std::fmt::Display for TierLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierLevel::Hot => write!(f, "hot"),
            TierLevel::Warm => write!(f, "warm"),
            TierLevel::Cold => write!(f, "cold"),
        }
    }
}

/// A cached value together with the time it was computed.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

impl<V> Entry<V> {
    pub fn new(value: V, inserted_at: Instant) -> Self {
        Self { value, inserted_at }
    }

    /// Age of the value at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    /// Whether the value has outlived `ttl`.
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.age(now) > ttl
    }
}
