//! A single capacity- and TTL-bounded cache level.
//!
//! Entries live in a sharded [`DashMap`], so lookups on different keys never
//! contend. A per-tier recency index (an unbounded [`LruCache`] of keys behind
//! a [`Mutex`]) orders residents by last touch and serializes the structural
//! changes of this tier only: admission, eviction and removal. Lock order is
//! always recency index first, then map shard.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;

use crate::cache::entry::{Entry, TierLevel};
use crate::config::{ConfigError, TierConfig};

/// Told about every capacity eviction, under the tier's structural lock and
/// while the victim is still stored.
pub trait EvictionListener<K>: Send + Sync {
    fn evicting(&self, key: &K);
}

/// Storage contract of one tier of the hierarchy.
///
/// Implementations never update recency on `get`; the hierarchy calls
/// [`CacheTier::touch`] once it has decided where the key lives, which keeps
/// cross-tier access statistics consistent.
pub trait CacheTier<K, V>: Send + Sync {
    fn level(&self) -> TierLevel;

    /// Current maximum number of resident entries.
    fn capacity(&self) -> usize;

    fn ttl(&self) -> Duration;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an unexpired entry. An expired entry is dropped and reported absent.
    fn get(&self, key: &K) -> Option<Entry<V>>;

    fn contains(&self, key: &K) -> bool;

    /// Mark `key` as most recently touched.
    fn touch(&self, key: &K);

    /// Insert or overwrite. Admitting a new key into a full tier evicts the
    /// least-recently-touched resident first and hands it back.
    fn put(&self, key: K, entry: Entry<V>) -> Option<(K, Entry<V>)>;

    fn remove(&self, key: &K) -> Option<Entry<V>>;

    /// Change capacity. Shrinking evicts least-recently-touched entries until
    /// the tier fits and returns them in eviction order.
    fn resize(&self, capacity: NonZeroUsize) -> Vec<(K, Entry<V>)>;

    /// Drop every entry older than the tier's TTL. Returns how many were dropped.
    fn purge_expired(&self, now: Instant) -> usize;

    /// Lifetime count of entries dropped for exceeding the TTL.
    fn expirations(&self) -> u64;

    fn clear(&self);
}

/// The default [`CacheTier`]: a sharded map plus a recency index.
pub struct ConcurrentTier<K, V> {
    level: TierLevel,
    capacity: AtomicUsize,
    ttl: Duration,
    store: DashMap<K, Entry<V>>,
    recency: Mutex<LruCache<K, ()>>,
    expirations: AtomicU64,
    listener: Option<Arc<dyn EvictionListener<K>>>,
}

impl<K, V> ConcurrentTier<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(level: TierLevel, capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            level,
            capacity: AtomicUsize::new(capacity.get()),
            ttl,
            store: DashMap::new(),
            recency: Mutex::new(LruCache::unbounded()),
            expirations: AtomicU64::new(0),
            listener: None,
        }
    }

    /// Report capacity evictions to `listener`.
    pub fn with_eviction_listener(mut self, listener: Arc<dyn EvictionListener<K>>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Build a tier from its configuration section.
    pub fn from_config(level: TierLevel, config: &TierConfig) -> Result<Self, ConfigError> {
        let capacity = NonZeroUsize::new(config.capacity).ok_or(ConfigError::InvalidCapacity {
            tier: level,
            min: config.min_capacity,
            capacity: config.capacity,
            max: config.max_capacity,
        })?;
        if config.ttl.is_zero() {
            return Err(ConfigError::InvalidTtl(level));
        }
        Ok(Self::new(level, capacity, config.ttl))
    }

    /// Pop recency order until a key that is still stored comes out.
    fn evict_lru(&self, order: &mut LruCache<K, ()>) -> Option<(K, Entry<V>)> {
        while let Some((victim, ())) = order.pop_lru() {
            // Every store mutation holds the recency lock, so this cannot go stale.
            if !self.store.contains_key(&victim) {
                continue;
            }
            if let Some(listener) = &self.listener {
                listener.evicting(&victim);
            }
            if let Some(evicted) = self.store.remove(&victim) {
                return Some(evicted);
            }
        }
        None
    }

    /// Remove `key` if, re-checked under the recency lock, it is still expired.
    fn expire(&self, key: &K, now: Instant) -> bool {
        let mut order = self.recency.lock();
        if self
            .store
            .remove_if(key, |_, entry| entry.is_expired(self.ttl, now))
            .is_some()
        {
            order.pop(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

impl<K, V> CacheTier<K, V> for ConcurrentTier<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn level(&self) -> TierLevel {
        self.level
    }

    fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn get(&self, key: &K) -> Option<Entry<V>> {
        let now = Instant::now();
        {
            let entry = self.store.get(key)?;
            if !entry.value().is_expired(self.ttl, now) {
                return Some(entry.value().clone());
            }
        }
        // The shard guard is released before taking the recency lock.
        self.expire(key, now);
        None
    }

    fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.store
            .get(key)
            .is_some_and(|entry| !entry.value().is_expired(self.ttl, now))
    }

    fn touch(&self, key: &K) {
        // Skipped under contention: recency only needs to be approximate.
        if let Some(mut order) = self.recency.try_lock() {
            order.promote(key);
        }
    }

    fn put(&self, key: K, entry: Entry<V>) -> Option<(K, Entry<V>)> {
        let mut order = self.recency.lock();
        let evicted = if !order.contains(&key) && order.len() >= self.capacity() {
            self.evict_lru(&mut order)
        } else {
            None
        };
        order.put(key.clone(), ());
        self.store.insert(key, entry);
        evicted
    }

    fn remove(&self, key: &K) -> Option<Entry<V>> {
        if !self.store.contains_key(key) {
            return None;
        }
        let mut order = self.recency.lock();
        order.pop(key);
        self.store.remove(key).map(|(_, entry)| entry)
    }

    fn resize(&self, capacity: NonZeroUsize) -> Vec<(K, Entry<V>)> {
        let mut order = self.recency.lock();
        self.capacity.store(capacity.get(), Ordering::Release);

        let mut evicted = Vec::new();
        while order.len() > capacity.get() {
            match self.evict_lru(&mut order) {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }
        evicted
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .store
            .iter()
            .filter(|item| item.value().is_expired(self.ttl, now))
            .map(|item| item.key().clone())
            .collect();

        expired.iter().filter(|key| self.expire(key, now)).count()
    }

    fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        let mut order = self.recency.lock();
        self.store.clear();
        order.clear();
    }
}
