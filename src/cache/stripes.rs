//! Striped per-key write locks and move tracking.
//!
//! Keys hash onto a fixed table of stripes. A stripe's mutex serializes the
//! writes that move its keys between tiers. Each stripe also counts the moves
//! currently in flight and the moves ever started, so a lookup that found its
//! key in no tier can tell whether a move on that stripe overlapped its lookup
//! and the miss might be spurious.
//!
//! A move starts before its first tier mutation and ends after its last:
//! - promotions and overwrites: insert into the target, remove other copies
//! - demotions: from the moment the tier evicts the entry (under the tier's
//!   structural lock, via [`EvictionListener`]) until it lands or is dropped

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::cache::tier::EvictionListener;

pub(crate) const KEY_STRIPES: usize = 1024;

pub(crate) struct Stripe {
    lock: Mutex<()>,
    in_flight: AtomicU64,
    started: AtomicU64,
}

/// Move activity of one stripe at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MoveStamp {
    in_flight: u64,
    started: u64,
}

impl Stripe {
    fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            in_flight: AtomicU64::new(0),
            started: AtomicU64::new(0),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub(crate) fn begin_move(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end_move(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn has_moves_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn stamp(&self) -> MoveStamp {
        MoveStamp {
            in_flight: self.in_flight.load(Ordering::SeqCst),
            started: self.started.load(Ordering::SeqCst),
        }
    }

    /// True if no move was in flight at `before` or now, and none started in between.
    pub(crate) fn quiet_since(&self, before: MoveStamp) -> bool {
        before.in_flight == 0 && self.stamp() == before
    }
}

pub(crate) struct KeyStripes {
    stripes: Box<[Stripe]>,
    hasher: RandomState,
}

impl KeyStripes {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Stripe::new()).collect(),
            hasher: RandomState::new(),
        }
    }

    pub(crate) fn stripe<K: Hash>(&self, key: &K) -> &Stripe {
        let hash = self.hasher.hash_one(key);
        &self.stripes[(hash as usize) % self.stripes.len()]
    }
}

impl<K: Hash> EvictionListener<K> for KeyStripes {
    fn evicting(&self, key: &K) {
        self.stripe(key).begin_move();
    }
}
