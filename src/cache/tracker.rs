//! Per-key access history shared by all tiers.
//!
//! The migration policy reads this history to decide where a key belongs; the
//! janitor prunes entries for keys that left the cache long ago, and the
//! prefetcher mines it for hot keys.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Access history of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessStat {
    /// Number of recorded accesses (puts and hits).
    pub frequency: u64,
    /// Time of the most recent recorded access.
    pub last_accessed: Instant,
}

impl AccessStat {
    /// Time elapsed since the recorded access.
    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_accessed)
    }
}

/// Concurrent key → [`AccessStat`] map.
pub struct AccessTracker<K> {
    stats: DashMap<K, AccessStat>,
}

impl<K> Default for AccessTracker<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> AccessTracker<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            stats: DashMap::new(),
        }
    }

    /// Record an access at `now`.
    ///
    /// Returns the history as this access sees it: the frequency including
    /// this access, and `last_accessed` set to the *previous* access (or `now`
    /// for a first access), so recency thresholds measure the gap between
    /// consecutive accesses.
    pub fn record_access(&self, key: &K, now: Instant) -> AccessStat {
        let mut stat = self.stats.entry(key.clone()).or_insert(AccessStat {
            frequency: 0,
            last_accessed: now,
        });
        let previous = stat.last_accessed;
        stat.frequency = stat.frequency.saturating_add(1);
        stat.last_accessed = now;
        AccessStat {
            frequency: stat.frequency,
            last_accessed: previous,
        }
    }

    pub fn get(&self, key: &K) -> Option<AccessStat> {
        self.stats.get(key).map(|stat| *stat)
    }

    pub fn remove(&self, key: &K) -> Option<AccessStat> {
        self.stats.remove(key).map(|(_, stat)| stat)
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn clear(&self) {
        self.stats.clear();
    }

    /// Drop histories idle longer than `staleness` whose key `is_resident`
    /// rejects. Returns how many were dropped.
    pub fn prune(
        &self,
        staleness: Duration,
        now: Instant,
        is_resident: impl Fn(&K) -> bool,
    ) -> usize {
        let candidates: Vec<K> = self
            .stats
            .iter()
            .filter(|item| item.value().idle(now) > staleness)
            .map(|item| item.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter(|key| !is_resident(key))
            .filter(|key| {
                self.stats
                    .remove_if(key, |_, stat| stat.idle(now) > staleness)
                    .is_some()
            })
            .count()
    }

    /// Up to `limit` keys with frequency of at least `min_frequency` that were
    /// accessed within `window`, most frequent first.
    pub fn hottest(
        &self,
        limit: usize,
        min_frequency: u64,
        window: Duration,
        now: Instant,
    ) -> Vec<(K, AccessStat)> {
        let mut hot: Vec<(K, AccessStat)> = self
            .stats
            .iter()
            .filter(|item| {
                let stat = item.value();
                stat.frequency >= min_frequency && stat.idle(now) <= window
            })
            .map(|item| (item.key().clone(), *item.value()))
            .collect();

        hot.sort_by(|a, b| b.1.frequency.cmp(&a.1.frequency));
        hot.truncate(limit);
        hot
    }
}
