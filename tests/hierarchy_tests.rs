//! Integration tests for lookup, placement and migration across tiers.

use std::thread;
use std::time::Duration;

use tiercache::cache::entry::TierLevel;
use tiercache::cache::hierarchy::Hierarchy;
use tiercache::config::{CacheConfig, TierConfig};

fn sized_config(hot: usize, warm: usize, cold: usize, ttl: Duration) -> CacheConfig {
    let mut config = CacheConfig::default();
    config.tiers.hot = TierConfig::fixed(hot, ttl);
    config.tiers.warm = TierConfig::fixed(warm, ttl);
    config.tiers.cold = TierConfig::fixed(cold, ttl);
    config
}

#[test]
fn test_put_then_get_round_trip() {
    let hierarchy: Hierarchy<String, String> = Hierarchy::new(CacheConfig::default()).unwrap();
    hierarchy.put("k".to_string(), "v".to_string());

    assert_eq!(hierarchy.get(&"k".to_string()), Some("v".to_string()));
    assert!(hierarchy.contains_key(&"k".to_string()));
    assert_eq!(hierarchy.get(&"missing".to_string()), None);
}

#[test]
fn test_overwrite_replaces_value() {
    let hierarchy: Hierarchy<u32, &'static str> = Hierarchy::new(CacheConfig::default()).unwrap();
    hierarchy.put(7, "old");
    hierarchy.put(7, "new");

    assert_eq!(hierarchy.get(&7), Some("new"));
    let stats = hierarchy.stats();
    assert_eq!(stats.tier_sizes.iter().sum::<usize>(), 1);
}

#[test]
fn test_entry_expires_after_ttl() {
    let hierarchy: Hierarchy<u32, u32> =
        Hierarchy::new(sized_config(4, 4, 4, Duration::from_millis(40))).unwrap();
    hierarchy.put(1, 100);
    assert_eq!(hierarchy.get(&1), Some(100));

    thread::sleep(Duration::from_millis(80));

    assert_eq!(hierarchy.get(&1), None);
    assert!(!hierarchy.contains_key(&1));
    assert!(hierarchy.stats().expirations >= 1);
}

#[test]
fn test_least_recent_entry_demoted_on_overflow() {
    let mut config = sized_config(2, 2, 2, Duration::from_secs(60));
    // Every put goes straight to the hot tier.
    config.migration.hot_min_frequency = 0;
    let hierarchy: Hierarchy<&'static str, u32> = Hierarchy::new(config).unwrap();

    hierarchy.put("a", 1);
    hierarchy.put("b", 2);
    hierarchy.put("c", 3);

    assert_eq!(hierarchy.tier_of(&"a"), Some(TierLevel::Warm));
    assert_eq!(hierarchy.tier_of(&"b"), Some(TierLevel::Hot));
    assert_eq!(hierarchy.tier_of(&"c"), Some(TierLevel::Hot));

    let stats = hierarchy.stats();
    assert_eq!(stats.demotions, 1);
    assert_eq!(stats.evictions, 0);
    assert_eq!(stats.tier_sizes, [2, 1, 0]);
}

#[test]
fn test_touch_protects_recently_read_entry() {
    let mut config = sized_config(2, 2, 2, Duration::from_secs(60));
    config.migration.hot_min_frequency = 0;
    let hierarchy: Hierarchy<&'static str, u32> = Hierarchy::new(config).unwrap();

    hierarchy.put("a", 1);
    hierarchy.put("b", 2);
    assert_eq!(hierarchy.get(&"a"), Some(1));
    hierarchy.put("c", 3);

    assert_eq!(hierarchy.tier_of(&"a"), Some(TierLevel::Hot));
    assert_eq!(hierarchy.tier_of(&"b"), Some(TierLevel::Warm));
}

#[test]
fn test_repeated_hits_promote_through_tiers() {
    let hierarchy: Hierarchy<&'static str, u32> = Hierarchy::new(CacheConfig::default()).unwrap();

    hierarchy.put("x", 1);
    assert_eq!(hierarchy.tier_of(&"x"), Some(TierLevel::Cold));

    // Frequency 2: not yet above the warm threshold.
    hierarchy.get(&"x");
    assert_eq!(hierarchy.tier_of(&"x"), Some(TierLevel::Cold));

    // Frequency 3: warm.
    hierarchy.get(&"x");
    assert_eq!(hierarchy.tier_of(&"x"), Some(TierLevel::Warm));

    // Frequencies 4..=10 stay warm, 11 reaches hot.
    for _ in 0..7 {
        hierarchy.get(&"x");
        assert_eq!(hierarchy.tier_of(&"x"), Some(TierLevel::Warm));
    }
    hierarchy.get(&"x");
    assert_eq!(hierarchy.tier_of(&"x"), Some(TierLevel::Hot));

    let before = hierarchy.stats();
    for _ in 0..5 {
        assert_eq!(hierarchy.get(&"x"), Some(1));
    }
    let after = hierarchy.stats();

    assert_eq!(before.hits_per_tier, [0, 8, 2]);
    assert_eq!(after.hits_per_tier, [5, 8, 2]);
    assert_eq!(after.promotions, 2);
    // Promotion moves the entry; no tier keeps a stale copy.
    assert!(!hierarchy.tier(TierLevel::Warm).contains(&"x"));
    assert!(!hierarchy.tier(TierLevel::Cold).contains(&"x"));
}

#[test]
fn test_put_on_hot_key_does_not_demote() {
    let mut config = CacheConfig::default();
    config.migration.hot_min_frequency = 1;
    config.migration.hot_recency = Duration::from_millis(30);
    config.migration.warm_min_frequency = 0;
    let hierarchy: Hierarchy<u32, u32> = Hierarchy::new(config).unwrap();

    hierarchy.put(1, 1);
    hierarchy.put(1, 2);
    assert_eq!(hierarchy.tier_of(&1), Some(TierLevel::Hot));

    // Idle past the hot window: placement alone would say warm.
    thread::sleep(Duration::from_millis(60));
    hierarchy.put(1, 3);
    assert_eq!(hierarchy.tier_of(&1), Some(TierLevel::Hot));
    assert_eq!(hierarchy.get(&1), Some(3));
}

#[test]
fn test_stats_account_for_every_request() {
    let hierarchy: Hierarchy<u32, u32> = Hierarchy::new(CacheConfig::default()).unwrap();
    for k in 0..10 {
        hierarchy.put(k, k);
    }
    for k in 0..20 {
        hierarchy.get(&k);
    }

    let stats = hierarchy.stats();
    assert_eq!(stats.total_requests, 20);
    assert_eq!(stats.total_hits(), 10);
    assert_eq!(stats.misses, 10);
    assert_eq!(stats.total_hits() + stats.misses, stats.total_requests);
    assert!((stats.overall_hit_rate() - 0.5).abs() < f64::EPSILON);
    assert!((stats.hit_rate_per_tier[2] - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_remove_drops_entry_and_history() {
    let hierarchy: Hierarchy<u32, u32> = Hierarchy::new(CacheConfig::default()).unwrap();
    hierarchy.put(3, 30);
    hierarchy.get(&3);
    hierarchy.remove(&3);

    assert!(!hierarchy.contains_key(&3));
    assert!(hierarchy.tracker().get(&3).is_none());
    assert_eq!(hierarchy.get(&3), None);

    // Removing an absent key is a no-op.
    hierarchy.remove(&3);
}

#[test]
fn test_purge_and_prune_after_expiry() {
    let hierarchy: Hierarchy<u32, u32> =
        Hierarchy::new(sized_config(4, 4, 4, Duration::from_millis(20))).unwrap();
    for k in 0..3 {
        hierarchy.put(k, k);
    }
    thread::sleep(Duration::from_millis(50));

    assert_eq!(hierarchy.purge_expired(), 3);
    assert_eq!(hierarchy.stats().tier_sizes, [0, 0, 0]);

    assert_eq!(hierarchy.prune_access_stats(Duration::from_millis(10)), 3);
    assert!(hierarchy.tracker().is_empty());
}
