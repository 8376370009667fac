//! Passive engine counters: searches, cache effectiveness, per-platform
//! errors, and latency.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use unisearch_connector::Platform;

/// Point-in-time view of the collector.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Searches issued (cache hits included).
    pub searches: u64,
    /// Responses served from the cache.
    pub cache_hits: u64,
    /// Searches that had to fetch upstream.
    pub cache_misses: u64,
    /// Failed platform dispatches, per platform.
    pub platform_errors: HashMap<Platform, u64>,
    /// Mean wall time of non-cached searches, in milliseconds.
    pub avg_latency_ms: f64,
}

/// Collects counters as searches run. All methods are cheap and lock-light;
/// reads never block writers for long.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    searches: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_samples: AtomicU64,
    platform_errors: Mutex<HashMap<Platform, u64>>,
}

impl MetricsCollector {
    /// Creates a zeroed collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one issued search.
    pub fn record_search(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the wall time of one non-cached search.
    pub fn record_latency_ms(&self, elapsed_ms: u64) {
        self.latency_total_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one failed platform dispatch.
    pub fn record_platform_error(&self, platform: Platform) {
        let mut errors = self
            .platform_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *errors.entry(platform).or_insert(0) += 1;
    }

    /// Snapshot read; does not disturb the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let total = self.latency_total_ms.load(Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let avg_latency_ms = if samples == 0 {
            0.0
        } else {
            total as f64 / samples as f64
        };

        MetricsSnapshot {
            searches: self.searches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            platform_errors: self
                .platform_errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            avg_latency_ms,
        }
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        self.searches.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.latency_total_ms.store(0, Ordering::Relaxed);
        self.latency_samples.store(0, Ordering::Relaxed);
        self.platform_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record_search();
        metrics.record_search();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_platform_error(Platform::Slack);
        metrics.record_platform_error(Platform::Slack);
        metrics.record_latency_ms(10);
        metrics.record_latency_ms(30);

        let snap = metrics.snapshot();
        assert_eq!(snap.searches, 2);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 1);
        assert_eq!(snap.platform_errors[&Platform::Slack], 2);
        assert!((snap.avg_latency_ms - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_zeroes_everything() {
        let metrics = MetricsCollector::new();
        metrics.record_search();
        metrics.record_platform_error(Platform::Gmail);
        metrics.record_latency_ms(100);

        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.searches, 0);
        assert!(snap.platform_errors.is_empty());
        assert!(snap.avg_latency_ms.abs() < f64::EPSILON);
    }

    #[test]
    fn empty_snapshot_has_zero_latency() {
        assert!(MetricsCollector::new().snapshot().avg_latency_ms.abs() < f64::EPSILON);
    }
}
