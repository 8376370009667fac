//! Content-addressed result cache with TTL, capacity eviction, and a
//! single-flight guarantee per fingerprint.
//!
//! Concurrent searches with the same fingerprint share one upstream fetch:
//! the first caller acquires the fingerprint's fetch lock, later callers
//! block on [`ResultCache::begin`] and find the stored entry when the lock
//! is released.

use crate::search::response::SearchResponse;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use unisearch_connector::AccountId;

/// Default entry lifetime.
pub const DEFAULT_TTL_SECS: i64 = 300;
/// Default entry capacity.
pub const DEFAULT_MAX_SIZE: usize = 64;

struct CacheEntry {
    response: SearchResponse,
    created_at: DateTime<Utc>,
    ttl: Duration,
    /// Accounts the originating request dispatched to, kept for
    /// per-account invalidation.
    accounts: Vec<AccountId>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= self.ttl
    }
}

/// Summary of one live entry, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntrySummary {
    /// Fingerprint key.
    pub key: String,
    /// When the entry was stored.
    pub created_at: DateTime<Utc>,
    /// Lifetime in seconds.
    pub ttl_secs: i64,
    /// Number of results in the stored response.
    pub result_count: usize,
}

/// Snapshot of cache state and effectiveness.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Live entries.
    pub size: usize,
    /// Capacity.
    pub max_size: usize,
    /// Hits since the counters were last reset.
    pub hits: u64,
    /// Misses since the counters were last reset.
    pub misses: u64,
    /// hits / (hits + misses); 0 when nothing was looked up yet.
    pub hit_rate: f64,
    /// Per-entry summaries.
    pub entries: Vec<CacheEntrySummary>,
}

/// Outcome of a cache lookup that may start a fetch.
pub enum Lookup {
    /// The entry was live; no fetch needed.
    Hit(SearchResponse),
    /// No live entry; the caller holds the fingerprint's fetch lock and
    /// must fetch and [`ResultCache::set`] before dropping the guard.
    Miss(FetchGuard),
}

/// Exclusive right to fetch one fingerprint. Dropping it releases the
/// fingerprint's fetch lock and cleans the pending map when no other caller
/// is waiting.
pub struct FetchGuard {
    key: String,
    lock: Arc<Mutex<()>>,
    permit: Option<OwnedMutexGuard<()>>,
    pending: Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        self.permit.take();
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Two owners left (the map and this guard) means nobody is waiting.
        if Arc::strong_count(&self.lock) <= 2 {
            pending.remove(&self.key);
        }
    }
}

/// TTL + capacity-bounded cache keyed by request fingerprint.
pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    pending: Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    max_size: usize,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl ResultCache {
    /// Creates a cache with the given capacity and default TTL.
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is zero or `default_ttl` is not positive.
    #[must_use]
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        assert!(max_size > 0, "cache capacity must be positive");
        assert!(default_ttl > Duration::zero(), "cache TTL must be positive");
        Self {
            entries: Mutex::new(HashMap::new()),
            pending: Arc::new(std::sync::Mutex::new(HashMap::new())),
            max_size,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The configured default TTL.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Looks up a live entry, recording a hit or miss. Expired entries are
    /// evicted here, lazily.
    pub async fn get(&self, key: &str) -> Option<SearchResponse> {
        let found = self.lookup(key).await;
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    async fn lookup(&self, key: &str) -> Option<SearchResponse> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|e| e.response.clone())
    }

    /// Looks up `key`; on a miss, waits for any in-flight fetch of the same
    /// fingerprint, re-checks, and hands the caller the fetch lock.
    pub async fn begin(&self, key: &str) -> Lookup {
        if let Some(response) = self.get(key).await {
            return Lookup::Hit(response);
        }

        let lock = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(pending.entry(key.to_string()).or_default())
        };
        let permit = Arc::clone(&lock).lock_owned().await;

        // A concurrent fetch may have stored the entry while we waited.
        if let Some(response) = self.lookup(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Lookup::Hit(response);
        }

        Lookup::Miss(FetchGuard {
            key: key.to_string(),
            lock,
            permit: Some(permit),
            pending: Arc::clone(&self.pending),
        })
    }

    /// Stores a response under `key` with the default TTL, evicting the
    /// oldest entry first when at capacity.
    pub async fn set(&self, key: &str, response: SearchResponse, accounts: Vec<AccountId>) {
        self.set_with_ttl(key, response, accounts, self.default_ttl)
            .await;
    }

    /// Stores a response with an explicit TTL.
    pub async fn set_with_ttl(
        &self,
        key: &str,
        response: SearchResponse,
        accounts: Vec<AccountId>,
        ttl: Duration,
    ) {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) && entries.len() >= self.max_size {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(key = %oldest, "evicting oldest cache entry");
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                response,
                created_at: Utc::now(),
                ttl,
                accounts,
            },
        );
    }

    /// Drops every entry. Counters are untouched.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Drops every entry whose originating request touched `account_id`.
    pub async fn invalidate_account(&self, account_id: &AccountId) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| !e.accounts.contains(account_id));
    }

    /// Zeroes the hit/miss counters. Entries are untouched.
    pub fn reset_counters(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Hits and misses since the last reset.
    #[must_use]
    pub fn counters(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Snapshot of size, hit rate, and per-entry summaries.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().await;
        let (hits, misses) = self.counters();
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };

        let mut summaries: Vec<CacheEntrySummary> = entries
            .iter()
            .map(|(key, e)| CacheEntrySummary {
                key: key.clone(),
                created_at: e.created_at,
                ttl_secs: e.ttl.num_seconds(),
                result_count: e.response.results.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        CacheStats {
            size: entries.len(),
            max_size: self.max_size,
            hits,
            misses,
            hit_rate,
            entries: summaries,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn response(n: usize) -> SearchResponse {
        SearchResponse {
            total: n,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn hit_within_ttl_miss_after() {
        let cache = ResultCache::new(4, Duration::milliseconds(40));
        cache.set("k", response(1), vec![]).await;

        assert!(cache.get("k").await.is_some());
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(cache.get("k").await.is_none());

        let (hits, misses) = cache.counters();
        assert_eq!((hits, misses), (1, 1));
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_first() {
        let cache = ResultCache::new(2, Duration::seconds(60));
        cache.set("first", response(1), vec![]).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cache.set("second", response(2), vec![]).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cache.set("third", response(3), vec![]).await;

        assert!(cache.get("first").await.is_none());
        assert!(cache.get("second").await.is_some());
        assert!(cache.get("third").await.is_some());
        assert_eq!(cache.stats().await.size, 2);
    }

    #[tokio::test]
    async fn overwrite_does_not_evict() {
        let cache = ResultCache::new(2, Duration::seconds(60));
        cache.set("a", response(1), vec![]).await;
        cache.set("b", response(2), vec![]).await;
        cache.set("a", response(3), vec![]).await;

        assert_eq!(cache.get("a").await.unwrap().total, 3);
        assert!(cache.get("b").await.is_some());
    }

    #[tokio::test]
    async fn invalidate_account_drops_matching_entries() {
        let cache = ResultCache::default();
        cache
            .set("k1", response(1), vec![AccountId::new("acc1")])
            .await;
        cache
            .set("k2", response(2), vec![AccountId::new("acc2")])
            .await;

        cache.invalidate_account(&AccountId::new("acc1")).await;

        assert!(cache.get("k1").await.is_none());
        assert!(cache.get("k2").await.is_some());
    }

    #[tokio::test]
    async fn begin_serializes_fetches_per_key() {
        let cache = Arc::new(ResultCache::default());

        let first = match cache.begin("k").await {
            Lookup::Miss(guard) => guard,
            Lookup::Hit(_) => panic!("empty cache cannot hit"),
        };

        // A second caller blocks until the first stores and releases.
        let second = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.begin("k").await })
        };
        tokio::task::yield_now().await;

        cache.set("k", response(7), vec![]).await;
        drop(first);

        match second.await.unwrap() {
            Lookup::Hit(found) => assert_eq!(found.total, 7),
            Lookup::Miss(_) => panic!("second caller should observe the stored entry"),
        }
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let cache = ResultCache::default();
        let g1 = match cache.begin("k1").await {
            Lookup::Miss(guard) => guard,
            Lookup::Hit(_) => panic!("empty cache cannot hit"),
        };
        // Must not deadlock.
        let g2 = match cache.begin("k2").await {
            Lookup::Miss(guard) => guard,
            Lookup::Hit(_) => panic!("empty cache cannot hit"),
        };
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn dropped_guard_cleans_pending_map() {
        let cache = ResultCache::default();
        let guard = match cache.begin("k").await {
            Lookup::Miss(guard) => guard,
            Lookup::Hit(_) => panic!("empty cache cannot hit"),
        };
        drop(guard);
        assert!(
            cache
                .pending
                .lock()
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn stats_report_rate_and_entries() {
        let cache = ResultCache::new(4, Duration::seconds(60));
        cache.set("k", response(3), vec![]).await;
        let _ = cache.get("k").await;
        let _ = cache.get("absent").await;

        let stats = cache.stats().await;
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, 4);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.entries[0].result_count, 0);

        cache.reset_counters();
        assert_eq!(cache.counters(), (0, 0));
    }
}
