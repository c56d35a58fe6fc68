//! Migration policy: decides which tier a key belongs in.
//!
//! The decision is a pure function of a key's [`AccessStat`]:
//!
//! ```text
//! frequency > hot_min_frequency  and idle <= hot_recency   → hot
//! frequency > warm_min_frequency and idle <= warm_recency  → warm
//! otherwise                                                → cold
//! ```
//!
//! where `idle` is the gap between the current and the previous access.

use std::time::Instant;

use crate::cache::entry::TierLevel;
use crate::cache::tracker::AccessStat;
use crate::config::MigrationConfig;

/// The migration policy engine.
#[derive(Debug, Clone)]
pub struct MigrationPolicy {
    config: MigrationConfig,
}

impl MigrationPolicy {
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Tier a key with this history should be placed in.
    pub fn placement(&self, stat: &AccessStat, now: Instant) -> TierLevel {
        let idle = stat.idle(now);

        if stat.frequency > self.config.hot_min_frequency && idle <= self.config.hot_recency {
            TierLevel::Hot
        } else if stat.frequency > self.config.warm_min_frequency
            && idle <= self.config.warm_recency
        {
            TierLevel::Warm
        } else {
            TierLevel::Cold
        }
    }

    /// Hotter tier a key hit in `current` should move to, if any.
    ///
    /// Never returns a colder tier: hits only promote.
    pub fn promotion_target(
        &self,
        stat: &AccessStat,
        current: TierLevel,
        now: Instant,
    ) -> Option<TierLevel> {
        let target = self.placement(stat, now);
        target.is_hotter_than(current).then_some(target)
    }
}
