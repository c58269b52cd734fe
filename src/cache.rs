//! Bounded in-memory page cache.
//!
//! Maps a [`CacheKey`] to an immutable [`PageResult`]. A single mutex guards
//! the map; the cache is shared process-wide by every repository of one
//! [`crate::handler::DataHandler`].
//!
//! # Eviction
//!
//! Entries are kept in insertion order. Reads use `peek` and never promote an
//! entry, so when the cache is full the oldest-inserted page is dropped.
//! Storing a page under an existing key counts as a fresh insertion.
//!
//! # Expiry
//!
//! The [`TtlPolicy`] gives each page an optional deadline computed at
//! insertion. Expired pages read as absent and are removed on that read.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::key::CacheKey;
use crate::observability::{CacheMetrics, LogMetrics, NoOpMetrics, TtlPolicy};
use crate::page::PageResult;

/// Cached page with its insertion time and optional deadline.
struct CacheEntry {
    value: Arc<PageResult>,
    inserted_at: Instant,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Arc<PageResult>, ttl: Option<Duration>) -> Self {
        let inserted_at = Instant::now();
        CacheEntry {
            value,
            inserted_at,
            expires_at: ttl.map(|d| inserted_at + d),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
}

struct Inner {
    entries: LruCache<CacheKey, CacheEntry>,
    counters: Counters,
}

/// Page cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
}

/// Bounded, optionally expiring store of page results.
///
/// # Example
///
/// ```
/// use recipe_ledger::cache::PageCache;
/// use recipe_ledger::config::CacheConfig;
///
/// let cache = PageCache::new(&CacheConfig::default().with_max_entries(2));
/// assert!(cache.is_empty());
/// assert_eq!(cache.capacity(), 2);
/// ```
pub struct PageCache {
    inner: Mutex<Inner>,
    ttl: TtlPolicy,
    metrics: Box<dyn CacheMetrics>,
}

impl PageCache {
    /// Create a cache with the configured capacity and TTL policy.
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        let metrics: Box<dyn CacheMetrics> = if config.log_events {
            Box::new(LogMetrics)
        } else {
            Box::new(NoOpMetrics)
        };
        PageCache {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                counters: Counters::default(),
            }),
            ttl: config.ttl.clone(),
            metrics,
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &dyn CacheMetrics {
        self.metrics.as_ref()
    }

    /// Cached page for `key`, if present and not expired.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<PageResult>> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let found = inner
            .entries
            .peek(key)
            .map(|entry| (entry.is_expired(now), entry.value.clone(), entry.inserted_at));

        match found {
            Some((false, value, inserted_at)) => {
                inner.counters.hits += 1;
                drop(guard);
                debug!("✓ PageCache GET {} -> HIT (age {:?})", key, now - inserted_at);
                self.metrics.record_hit(key.as_str());
                Some(value)
            }
            Some((true, _, _)) => {
                inner.entries.pop(key);
                inner.counters.expirations += 1;
                inner.counters.misses += 1;
                drop(guard);
                debug!("✓ PageCache GET {} -> EXPIRED", key);
                self.metrics.record_expiry(key.as_str());
                self.metrics.record_miss(key.as_str());
                None
            }
            None => {
                inner.counters.misses += 1;
                drop(guard);
                debug!("✓ PageCache GET {} -> MISS", key);
                self.metrics.record_miss(key.as_str());
                None
            }
        }
    }

    /// Store `page` under `key`, evicting the oldest entry when full.
    ///
    /// Returns the shared handle now owned by the cache.
    pub fn put(&self, key: CacheKey, page: PageResult) -> Arc<PageResult> {
        let value = Arc::new(page);
        let ttl = self.ttl.get_ttl(key.entity());
        let entry = CacheEntry::new(value.clone(), ttl);

        let evicted = {
            let mut inner = self.inner.lock();
            match inner.entries.push(key.clone(), entry) {
                Some((old_key, _)) if old_key != key => {
                    inner.counters.evictions += 1;
                    Some(old_key)
                }
                _ => None,
            }
        };

        match ttl {
            Some(d) => debug!("✓ PageCache SET {} (TTL: {:?})", key, d),
            None => debug!("✓ PageCache SET {}", key),
        }
        self.metrics.record_set(key.as_str());

        if let Some(old_key) = evicted {
            debug!("✓ PageCache EVICT {} (capacity reached)", old_key);
            self.metrics.record_eviction(old_key.as_str());
        }

        value
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.entries.pop(key).is_some();
            if removed {
                inner.counters.invalidations += 1;
            }
            removed
        };
        debug!("✓ PageCache DELETE {} (present: {})", key, removed);
        self.metrics.record_invalidation(key.as_str(), usize::from(removed));
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.entries.len();
            inner.entries.clear();
            inner.counters.invalidations += removed as u64;
            removed
        };
        info!("PageCache cleared ({} entries)", removed);
        self.metrics.record_invalidation("*", removed);
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many were
    /// removed.
    pub fn clear_matching(&self, prefix: &str) -> usize {
        let removed = {
            let mut inner = self.inner.lock();
            let doomed: Vec<CacheKey> = inner
                .entries
                .iter()
                .filter(|(key, _)| key.as_str().starts_with(prefix))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &doomed {
                inner.entries.pop(key);
            }
            inner.counters.invalidations += doomed.len() as u64;
            doomed.len()
        };
        debug!("✓ PageCache CLEAR {}* ({} entries)", prefix, removed);
        self.metrics.record_invalidation(prefix, removed);
        removed
    }

    /// Remove every expired entry now instead of on the next read.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        inner.counters.expirations += expired.len() as u64;
        expired.len()
    }

    /// Get the current number of entries (expired ones included until read).
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.cap().get()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            expired_entries: inner
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .count(),
            hits: inner.counters.hits,
            misses: inner.counters.misses,
            evictions: inner.counters.evictions,
            expirations: inner.counters.expirations,
            invalidations: inner.counters.invalidations,
        }
    }

    /// Print cache statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.stats();
        debug!(
            "PageCache Stats: {} entries ({} expired), {} hits, {} misses, {} evictions",
            stats.entries, stats.expired_entries, stats.hits, stats.misses, stats.evictions
        );
    }
}

impl Default for PageCache {
    fn default() -> Self {
        PageCache::new(&CacheConfig::default())
    }
}

impl fmt::Debug for PageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnAllowList;
    use crate::key::CacheKeyBuilder;
    use crate::query::{Filters, PageRequest, QueryBuilder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(entity: &str, page: i64) -> CacheKey {
        let columns = ColumnAllowList::new("id").column("id", "id");
        let request = QueryBuilder::new(&columns)
            .normalize(&PageRequest::new(page, 20), &Filters::new())
            .unwrap();
        CacheKeyBuilder::for_page(entity, &request).unwrap()
    }

    fn page(total: u64) -> PageResult {
        PageResult::new(Vec::new(), vec!["id".to_string()], 1, 20, total)
    }

    #[test]
    fn test_put_get() {
        let cache = PageCache::default();
        let stored = cache.put(key("produtos", 1), page(5));

        let hit = cache.get(&key("produtos", 1)).expect("cached");
        assert!(Arc::ptr_eq(&stored, &hit));
        assert_eq!(hit.total_items(), 5);
        assert!(cache.get(&key("produtos", 2)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_oldest_inserted_is_evicted() {
        let cache = PageCache::new(&CacheConfig::default().with_max_entries(2));
        cache.put(key("produtos", 1), page(1));
        cache.put(key("produtos", 2), page(2));

        // Reads do not promote page 1.
        assert!(cache.get(&key("produtos", 1)).is_some());

        cache.put(key("produtos", 3), page(3));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&key("produtos", 1)));
        assert!(cache.contains(&key("produtos", 2)));
        assert!(cache.contains(&key("produtos", 3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_reinsert_replaces_without_eviction() {
        let cache = PageCache::new(&CacheConfig::default().with_max_entries(2));
        cache.put(key("produtos", 1), page(1));
        cache.put(key("produtos", 2), page(2));
        cache.put(key("produtos", 1), page(10));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get(&key("produtos", 1)).unwrap().total_items(), 10);

        // Page 1 is now the newest, so page 2 goes first.
        cache.put(key("produtos", 3), page(3));
        assert!(!cache.contains(&key("produtos", 2)));
        assert!(cache.contains(&key("produtos", 1)));
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = PageCache::new(
            &CacheConfig::default().with_ttl(TtlPolicy::Fixed(Duration::from_millis(20))),
        );
        cache.put(key("produtos", 1), page(1));
        assert!(cache.get(&key("produtos", 1)).is_some());

        std::thread::sleep(Duration::from_millis(40));

        assert!(cache.get(&key("produtos", 1)).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_ttl_per_entity() {
        let cache = PageCache::new(&CacheConfig::default().with_ttl(TtlPolicy::PerEntity(
            |entity| match entity {
                "produtos" => Duration::from_millis(10),
                _ => Duration::from_secs(3600),
            },
        )));
        cache.put(key("produtos", 1), page(1));
        cache.put(key("receitas", 1), page(1));

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.stats().expired_entries, 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.contains(&key("receitas", 1)));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = PageCache::default();
        cache.put(key("produtos", 1), page(1));
        cache.put(key("produtos", 2), page(1));

        assert!(cache.invalidate(&key("produtos", 1)));
        assert!(!cache.invalidate(&key("produtos", 1)));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_matching_only_touches_prefix() {
        let cache = PageCache::default();
        cache.put(key("produtos", 1), page(1));
        cache.put(key("produtos", 2), page(1));
        cache.put(key("receitas", 1), page(1));

        let removed = cache.clear_matching(&CacheKeyBuilder::entity_prefix("produtos"));
        assert_eq!(removed, 2);
        assert!(cache.contains(&key("receitas", 1)));
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_zero_capacity_is_treated_as_one() {
        let cache = PageCache::new(&CacheConfig::default().with_max_entries(0));
        assert_eq!(cache.capacity(), 1);
        cache.put(key("produtos", 1), page(1));
        cache.put(key("produtos", 2), page(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_log_events_cache_behaves_the_same() {
        let cache = PageCache::new(&CacheConfig::default().with_max_entries(1).with_log_events(true));
        cache.put(key("produtos", 1), page(1));
        cache.put(key("produtos", 2), page(2));

        assert!(cache.get(&key("produtos", 1)).is_none());
        assert!(cache.get(&key("produtos", 2)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_custom_metrics_receive_events() {
        #[derive(Default)]
        struct Counting {
            hits: Arc<AtomicUsize>,
            evictions: Arc<AtomicUsize>,
        }

        impl CacheMetrics for Counting {
            fn record_hit(&self, _key: &str) {
                self.hits.fetch_add(1, Ordering::SeqCst);
            }

            fn record_eviction(&self, _key: &str) {
                self.evictions.fetch_add(1, Ordering::SeqCst);
            }
        }

        let metrics = Counting::default();
        let hits = metrics.hits.clone();
        let evictions = metrics.evictions.clone();
        let cache = PageCache::new(&CacheConfig::default().with_max_entries(1))
            .with_metrics(Box::new(metrics));

        cache.put(key("produtos", 1), page(1));
        cache.get(&key("produtos", 1));
        cache.put(key("produtos", 2), page(1));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
    }
}
