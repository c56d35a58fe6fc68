//! Tier hierarchy: orchestrates lookups and placement across the tiers.
//!
//! The hierarchy is the central coordinator of the cache. It:
//! - Probes tiers hottest-first on lookup and records per-tier hits
//! - Places new entries according to the migration policy
//! - Promotes entries on qualifying hits
//! - Cascades capacity evictions down the hierarchy as demotions
//! - Exposes the hooks the janitor, auto-tuner and prefetcher drive
//!
//! Every cross-tier move inserts into the destination before removing from
//! the source. Writes to a key (put, promotion, landing a demoted entry,
//! removal) hold that key's stripe lock, so operations on the same key never
//! interleave. No thread ever holds two stripes: entries a write displaces
//! are carried down only after the writer's stripe is released.
//!
//! Lookups take no lock. A lookup that finds nothing looks again while a move on
//! the key's stripe overlapped it, so a key in transit between tiers is never
//! reported missing.

use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::cache::entry::{Entry, TierLevel};
use crate::cache::policy::MigrationPolicy;
use crate::cache::stats::{CacheStats, StatsRecorder, TierCounters};
use crate::cache::stripes::{KeyStripes, KEY_STRIPES};
use crate::cache::tier::{CacheTier, ConcurrentTier, EvictionListener};
use crate::cache::tracker::AccessTracker;
use crate::config::{CacheConfig, ConfigError};

/// The tier hierarchy.
pub struct Hierarchy<K, V> {
    /// Tiers indexed by [`TierLevel::index`], hottest first.
    tiers: [Box<dyn CacheTier<K, V>>; TierLevel::COUNT],

    /// Access history shared across tiers.
    tracker: AccessTracker<K>,

    /// Placement decisions.
    policy: MigrationPolicy,

    /// Hot-path counters.
    stats: StatsRecorder,

    /// Per-key write locks and in-flight moves.
    stripes: Arc<KeyStripes>,

    /// Configuration.
    config: Arc<CacheConfig>,
}

impl<K, V> Hierarchy<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a hierarchy with the given configuration.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let stripes = Arc::new(KeyStripes::new(KEY_STRIPES));
        let listener: Arc<dyn EvictionListener<K>> = stripes.clone();
        let tier = |level: TierLevel| -> Result<Box<dyn CacheTier<K, V>>, ConfigError> {
            let built = ConcurrentTier::from_config(level, config.tiers.get(level))?
                .with_eviction_listener(listener.clone());
            Ok(Box::new(built))
        };
        let tiers = [
            tier(TierLevel::Hot)?,
            tier(TierLevel::Warm)?,
            tier(TierLevel::Cold)?,
        ];

        debug!(
            hot = config.tiers.hot.capacity,
            warm = config.tiers.warm.capacity,
            cold = config.tiers.cold.capacity,
            "Tier hierarchy created"
        );

        Ok(Self {
            tiers,
            tracker: AccessTracker::new(),
            policy: MigrationPolicy::new(config.migration.clone()),
            stats: StatsRecorder::default(),
            stripes,
            config: Arc::new(config),
        })
    }

    /// The tier at `level`.
    pub fn tier(&self, level: TierLevel) -> &dyn CacheTier<K, V> {
        self.tiers[level.index()].as_ref()
    }

    pub fn tracker(&self) -> &AccessTracker<K> {
        &self.tracker
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up `key`, promoting it if its history now earns a hotter tier.
    pub fn get(&self, key: &K) -> Option<V> {
        let stripe = self.stripes.stripe(key);
        loop {
            let before = stripe.stamp();
            if let Some((level, entry)) = self.probe(key) {
                return Some(self.on_hit(key, level, entry));
            }
            if stripe.quiet_since(before) {
                break;
            }
            // A move on this stripe overlapped the lookup; the key may have been in transit.
            std::thread::yield_now();
        }

        for level in TierLevel::ALL {
            self.stats.record_probe(level);
        }
        self.stats.record_miss();
        None
    }

    /// Insert or overwrite `key` in the tier its history earns.
    ///
    /// Overwriting never moves a resident key to a colder tier.
    pub fn put(&self, key: K, value: V) {
        let now = Instant::now();
        let stripe = self.stripes.stripe(&key);

        let (target, displaced) = {
            let _guard = stripe.lock();
            let stat = self.tracker.record_access(&key, now);

            let mut target = self.policy.placement(&stat, now);
            if let Some(current) = self.tier_of(&key) {
                if current.is_hotter_than(target) {
                    target = current;
                }
            }

            stripe.begin_move();
            let displaced = self.tier(target).put(key.clone(), Entry::new(value, now));
            self.remove_other_copies(&key, target);
            stripe.end_move();
            (target, displaced)
        };

        if let Some(victim) = displaced {
            self.settle(target, victim, now);
        }
    }

    /// Insert a speculatively loaded value into the coldest tier.
    ///
    /// Does nothing and returns false if the key is already resident. No
    /// access is recorded, so an unconfirmed value never earns promotion by
    /// being prefetched.
    pub fn put_speculative(&self, key: K, value: V) -> bool {
        let now = Instant::now();
        let stripe = self.stripes.stripe(&key);

        let displaced = {
            let _guard = stripe.lock();
            if self.contains_key(&key) {
                return false;
            }
            let displaced = self.tier(TierLevel::Cold).put(key, Entry::new(value, now));
            self.stats.record_prefetch();
            displaced
        };

        if let Some(victim) = displaced {
            self.settle(TierLevel::Cold, victim, now);
        }
        true
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.tiers.iter().any(|tier| tier.contains(key))
    }

    /// Hottest tier currently holding `key`.
    pub fn tier_of(&self, key: &K) -> Option<TierLevel> {
        TierLevel::ALL
            .into_iter()
            .find(|level| self.tier(*level).contains(key))
    }

    /// Remove `key` from whichever tier holds it, along with its history.
    pub fn remove(&self, key: &K) {
        let stripe = self.stripes.stripe(key);
        loop {
            {
                let _guard = stripe.lock();
                for tier in &self.tiers {
                    tier.remove(key);
                }
                self.tracker.remove(key);
                // Anything evicted on this stripe and not yet landed could be this key.
                if !stripe.has_moves_in_flight() {
                    return;
                }
            }
            std::thread::yield_now();
        }
    }

    /// Drop every entry and all access history. Lifetime counters are kept.
    pub fn clear(&self) {
        for tier in &self.tiers {
            tier.clear();
        }
        self.tracker.clear();
    }

    /// Snapshot of counters, sizes and capacities.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.snapshot();
        for tier in &self.tiers {
            let idx = tier.level().index();
            stats.tier_sizes[idx] = tier.len();
            stats.tier_capacities[idx] = tier.capacity();
            stats.expirations += tier.expirations();
        }
        stats
    }

    /// Probe and hit counters of one tier.
    pub fn tier_counters(&self, level: TierLevel) -> TierCounters {
        self.stats.tier_counters(level)
    }

    /// Drop expired entries from every tier. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.tiers.iter().map(|tier| tier.purge_expired(now)).sum()
    }

    /// Drop histories of keys resident nowhere and idle beyond `staleness`.
    pub fn prune_access_stats(&self, staleness: Duration) -> usize {
        let now = Instant::now();
        self.tracker
            .prune(staleness, now, |key| self.contains_key(key))
    }

    /// Change one tier's capacity; entries evicted by a shrink cascade down.
    /// Returns how many entries left the tier.
    pub fn resize_tier(&self, level: TierLevel, capacity: NonZeroUsize) -> usize {
        let evicted = self.tier(level).resize(capacity);
        let count = evicted.len();
        let now = Instant::now();
        for victim in evicted {
            self.settle(level, victim, now);
        }
        count
    }

    /// First tier holding an unexpired copy of `key`.
    fn probe(&self, key: &K) -> Option<(TierLevel, Entry<V>)> {
        TierLevel::ALL
            .into_iter()
            .find_map(|level| self.tier(level).get(key).map(|entry| (level, entry)))
    }

    fn on_hit(&self, key: &K, level: TierLevel, entry: Entry<V>) -> V {
        for probed in TierLevel::ALL.into_iter().take(level.index() + 1) {
            self.stats.record_probe(probed);
        }
        self.tier(level).touch(key);
        self.stats.record_hit(level);

        let now = Instant::now();
        let stat = self.tracker.record_access(key, now);
        if let Some(target) = self.policy.promotion_target(&stat, level, now) {
            if let Some(victim) = self.promote(key, level, target, now) {
                self.settle(target, victim, now);
            }
        }
        entry.value
    }

    /// Move `key` from `from` up to `to`. Returns the entry this displaced
    /// from `to`, which the caller must settle.
    fn promote(
        &self,
        key: &K,
        from: TierLevel,
        to: TierLevel,
        now: Instant,
    ) -> Option<(K, Entry<V>)> {
        let stripe = self.stripes.stripe(key);
        let _guard = stripe.lock();

        // Re-read under the key lock: a concurrent write may have moved or replaced it.
        let entry = self.tier(from).get(key)?;
        if entry.is_expired(self.tier(to).ttl(), now) {
            trace!(?key, %from, %to, "Entry older than target TTL, not promoted");
            return None;
        }

        stripe.begin_move();
        let displaced = self.tier(to).put(key.clone(), entry);
        self.remove_other_copies(key, to);
        stripe.end_move();

        self.stats.record_promotion();
        debug!(?key, %from, %to, "Promoted entry");
        displaced
    }

    /// Carry an entry evicted from `from` down the hierarchy until it lands in
    /// a tier without displacing anything, or leaves the coldest tier.
    ///
    /// The entry's move was opened by the tier that evicted it and is closed
    /// here. Must be called with no stripe held.
    fn settle(&self, from: TierLevel, victim: (K, Entry<V>), now: Instant) {
        let (mut key, mut entry) = victim;
        let mut from = from;

        loop {
            let stripe = self.stripes.stripe(&key);
            let next = match from.colder() {
                Some(next) if !entry.is_expired(self.tier(next).ttl(), now) => next,
                _ => {
                    trace!(?key, %from, "Evicted entry");
                    self.stats.record_eviction();
                    stripe.end_move();
                    return;
                }
            };

            let guard = stripe.lock();
            if self.contains_key(&key) {
                // Rewritten since it was evicted; this copy is stale.
                trace!(?key, %from, "Dropped superseded entry");
                stripe.end_move();
                return;
            }

            trace!(?key, %from, to = %next, "Demoted entry");
            self.stats.record_demotion();
            let displaced = self.tier(next).put(key, entry);
            stripe.end_move();
            drop(guard);

            match displaced {
                Some((victim, victim_entry)) => {
                    from = next;
                    key = victim;
                    entry = victim_entry;
                }
                None => return,
            }
        }
    }

    fn remove_other_copies(&self, key: &K, keep: TierLevel) {
        for level in TierLevel::ALL {
            if level != keep {
                self.tier(level).remove(key);
            }
        }
    }
}

/// Thread-safe handle to a hierarchy. No outer lock: the tiers synchronize internally.
pub type SharedHierarchy<K, V> = Arc<Hierarchy<K, V>>;

/// Create a new shared hierarchy.
pub fn new_shared_hierarchy<K, V>(config: CacheConfig) -> Result<SharedHierarchy<K, V>, ConfigError>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Ok(Arc::new(Hierarchy::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;

    fn test_config(hot: usize, warm: usize, cold: usize) -> CacheConfig {
        let ttl = Duration::from_secs(60);
        let mut config = CacheConfig::default();
        config.tiers.hot = TierConfig::fixed(hot, ttl);
        config.tiers.warm = TierConfig::fixed(warm, ttl);
        config.tiers.cold = TierConfig::fixed(cold, ttl);
        config
    }

    #[test]
    fn test_new_key_lands_in_cold_tier() {
        let hierarchy: Hierarchy<String, u32> = Hierarchy::new(test_config(2, 4, 8)).unwrap();
        hierarchy.put("a".to_string(), 1);

        assert_eq!(hierarchy.tier_of(&"a".to_string()), Some(TierLevel::Cold));
        assert_eq!(hierarchy.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = test_config(2, 4, 8);
        config.tiers.hot.min_capacity = 0;
        config.tiers.hot.capacity = 0;
        assert!(Hierarchy::<String, u32>::new(config).is_err());
    }

    #[test]
    fn test_cold_eviction_drops_and_counts() {
        let hierarchy: Hierarchy<u32, u32> = Hierarchy::new(test_config(1, 1, 2)).unwrap();
        for k in 0..3 {
            hierarchy.put(k, k);
        }

        let stats = hierarchy.stats();
        assert_eq!(stats.tier_sizes, [0, 0, 2]);
        assert_eq!(stats.evictions, 1);
        assert!(!hierarchy.contains_key(&0));
    }

    #[test]
    fn test_resize_tier_cascades_evictions() {
        let mut config = test_config(4, 4, 4);
        config.migration.hot_min_frequency = 0;
        let hierarchy: Hierarchy<u32, u32> = Hierarchy::new(config).unwrap();
        for k in 0..4 {
            hierarchy.put(k, k);
        }
        assert_eq!(hierarchy.stats().tier_sizes, [4, 0, 0]);

        let moved = hierarchy.resize_tier(TierLevel::Hot, NonZeroUsize::new(1).unwrap());
        assert_eq!(moved, 3);

        let stats = hierarchy.stats();
        assert_eq!(stats.tier_sizes, [1, 3, 0]);
        assert_eq!(stats.tier_capacities[0], 1);
        assert_eq!(stats.demotions, 3);
        assert_eq!(hierarchy.tier_of(&3), Some(TierLevel::Hot));
        assert_eq!(hierarchy.tier_of(&0), Some(TierLevel::Warm));
    }

    #[test]
    fn test_put_speculative_only_fills_absent_keys() {
        let hierarchy: Hierarchy<u32, u32> = Hierarchy::new(test_config(2, 2, 2)).unwrap();
        hierarchy.put(1, 10);

        assert!(!hierarchy.put_speculative(1, 99));
        assert_eq!(hierarchy.get(&1), Some(10));

        assert!(hierarchy.put_speculative(2, 20));
        assert_eq!(hierarchy.tier_of(&2), Some(TierLevel::Cold));
        assert!(hierarchy.tracker().get(&2).is_none());
        assert_eq!(hierarchy.stats().prefetched, 1);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let hierarchy: Hierarchy<u32, u32> = Hierarchy::new(test_config(2, 2, 2)).unwrap();
        hierarchy.put(1, 1);
        hierarchy.get(&1);
        hierarchy.clear();

        assert!(!hierarchy.contains_key(&1));
        assert!(hierarchy.tracker().is_empty());
        let stats = hierarchy.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.tier_sizes, [0, 0, 0]);
    }
}
