//! Prometheus exposition of cache statistics.

use prometheus::{Encoder, GaugeVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::entry::TierLevel;
use crate::cache::stats::CacheStats;

/// Gauges mirroring a [`CacheStats`] snapshot.
pub struct CacheMetrics {
    registry: Registry,
    requests: IntGauge,
    misses: IntGauge,
    evictions: IntGauge,
    demotions: IntGauge,
    promotions: IntGauge,
    expirations: IntGauge,
    prefetched: IntGauge,
    hits: IntGaugeVec,
    sizes: IntGaugeVec,
    capacities: IntGaugeVec,
    hit_rates: GaugeVec,
}

impl CacheMetrics {
    /// Register every gauge under the `tiercache_` prefix.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let int_gauge = |name: &str, help: &str| -> prometheus::Result<IntGauge> {
            let gauge = IntGauge::with_opts(Opts::new(name, help).namespace("tiercache"))?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };
        let requests = int_gauge("requests_total", "Lookups served or missed")?;
        let misses = int_gauge("misses_total", "Lookups no tier could serve")?;
        let evictions = int_gauge("evictions_total", "Entries dropped for lack of space")?;
        let demotions = int_gauge("demotions_total", "Entries moved to a colder tier")?;
        let promotions = int_gauge("promotions_total", "Entries moved to a hotter tier")?;
        let expirations = int_gauge("expirations_total", "Entries dropped for exceeding TTL")?;
        let prefetched = int_gauge("prefetched_total", "Entries inserted by the prefetcher")?;

        let tier_gauge = |name: &str, help: &str| -> prometheus::Result<IntGaugeVec> {
            let gauge = IntGaugeVec::new(Opts::new(name, help).namespace("tiercache"), &["tier"])?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };
        let hits = tier_gauge("hits_total", "Lookups served by a tier")?;
        let sizes = tier_gauge("tier_size", "Resident entries in a tier")?;
        let capacities = tier_gauge("tier_capacity", "Current capacity of a tier")?;

        let hit_rates = GaugeVec::new(
            Opts::new("tier_hit_rate", "Hits over lookups that reached a tier").namespace("tiercache"),
            &["tier"],
        )?;
        registry.register(Box::new(hit_rates.clone()))?;

        Ok(Self {
            registry,
            requests,
            misses,
            evictions,
            demotions,
            promotions,
            expirations,
            prefetched,
            hits,
            sizes,
            capacities,
            hit_rates,
        })
    }

    /// Update every gauge from `stats`.
    pub fn observe(&self, stats: &CacheStats) {
        self.requests.set(saturating_i64(stats.total_requests));
        self.misses.set(saturating_i64(stats.misses));
        self.evictions.set(saturating_i64(stats.evictions));
        self.demotions.set(saturating_i64(stats.demotions));
        self.promotions.set(saturating_i64(stats.promotions));
        self.expirations.set(saturating_i64(stats.expirations));
        self.prefetched.set(saturating_i64(stats.prefetched));

        for level in TierLevel::ALL {
            let idx = level.index();
            let label = level.to_string();
            self.hits
                .with_label_values(&[label.as_str()])
                .set(saturating_i64(stats.hits_per_tier[idx]));
            self.sizes
                .with_label_values(&[label.as_str()])
                .set(saturating_i64(stats.tier_sizes[idx] as u64));
            self.capacities
                .with_label_values(&[label.as_str()])
                .set(saturating_i64(stats.tier_capacities[idx] as u64));
            self.hit_rates
                .with_label_values(&[label.as_str()])
                .set(stats.hit_rate_per_tier[idx]);
        }
    }

    /// Text exposition of the current gauge values.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_tier_labels() {
        let metrics = CacheMetrics::new().unwrap();
        let stats = CacheStats {
            total_requests: 10,
            hits_per_tier: [6, 2, 1],
            misses: 1,
            tier_sizes: [3, 4, 5],
            tier_capacities: [8, 16, 32],
            hit_rate_per_tier: [0.6, 0.5, 0.5],
            ..Default::default()
        };
        metrics.observe(&stats);

        let text = metrics.render().unwrap();
        assert!(text.contains("tiercache_requests_total 10"));
        assert!(text.contains("tiercache_hits_total{tier=\"hot\"} 6"));
        assert!(text.contains("tiercache_tier_capacity{tier=\"cold\"} 32"));
    }
}
