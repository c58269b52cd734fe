//! Cache event hooks and expiry policy.
//!
//! This module separates two concerns of the page cache:
//!
//! - **Metrics (`CacheMetrics`)**: hooks for hits, misses, stores, evictions,
//!   expirations, invalidations and store round-trips
//! - **TTL Policies (`TtlPolicy`)**: how long a cached page stays valid
//!
//! # Metrics
//!
//! Implement `CacheMetrics` to feed your own counters:
//!
//! ```ignore
//! use recipe_ledger::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct StatusBarMetrics;
//!
//! impl CacheMetrics for StatusBarMetrics {
//!     fn record_query(&self, key: &str, duration: Duration) {
//!         // show "loaded in 12ms" in the status bar
//!     }
//! }
//!
//! // let cache = PageCache::new(&CacheConfig::default())
//! //     .with_metrics(Box::new(StatusBarMetrics));
//! ```
//!
//! The page cache uses `NoOpMetrics` unless told otherwise. `LogMetrics`
//! keeps the trait's default bodies, which write every event to the `log`
//! facade at debug level; `CacheConfig::with_log_events(true)` selects it.
//!
//! # TTL Policies
//!
//! ```
//! use recipe_ledger::observability::TtlPolicy;
//! use std::time::Duration;
//!
//! // Pages never expire; only mutations invalidate them
//! let _policy = TtlPolicy::Never;
//!
//! // Every page lives five minutes
//! let _policy = TtlPolicy::Fixed(Duration::from_secs(300));
//!
//! // Product stock moves faster than recipes
//! let _policy = TtlPolicy::PerEntity(|entity| match entity {
//!     "produtos" => Duration::from_secs(60),
//!     _ => Duration::from_secs(600),
//! });
//! ```

use std::time::Duration;

/// Hooks invoked by the page cache and the paged repositories.
pub trait CacheMetrics: Send + Sync {
    /// Page served from cache.
    fn record_hit(&self, key: &str) {
        debug!("Cache HIT: {}", key);
    }

    /// Page not cached (or expired).
    fn record_miss(&self, key: &str) {
        debug!("Cache MISS: {}", key);
    }

    /// Page stored.
    fn record_set(&self, key: &str) {
        debug!("Cache SET: {}", key);
    }

    /// Oldest page dropped to make room.
    fn record_eviction(&self, key: &str) {
        debug!("Cache EVICT: {}", key);
    }

    /// Page dropped because its TTL elapsed.
    fn record_expiry(&self, key: &str) {
        debug!("Cache EXPIRE: {}", key);
    }

    /// Pages dropped by an explicit invalidation.
    fn record_invalidation(&self, scope: &str, removed: usize) {
        debug!("Cache INVALIDATE {}: {} entries", scope, removed);
    }

    /// SELECT + COUNT round-trip for a cache miss.
    fn record_query(&self, key: &str, duration: Duration) {
        debug!("Store query for {} took {:?}", key, duration);
    }

    /// Failed page load.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Page load ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str) {}
    fn record_miss(&self, _key: &str) {}
    fn record_set(&self, _key: &str) {}
    fn record_eviction(&self, _key: &str) {}
    fn record_expiry(&self, _key: &str) {}
    fn record_invalidation(&self, _scope: &str, _removed: usize) {}
    fn record_query(&self, _key: &str, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics that write every event to the `log` facade.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}

/// TTL (Time-to-Live) policy for cached pages.
#[derive(Clone, Debug, Default)]
pub enum TtlPolicy {
    /// Pages live until invalidated or evicted.
    #[default]
    Never,

    /// Fixed duration for all pages
    Fixed(Duration),

    /// Duration chosen per entity name
    PerEntity(fn(&str) -> Duration),
}

impl TtlPolicy {
    /// Get TTL for an entity.
    pub fn get_ttl(&self, entity: &str) -> Option<Duration> {
        match self {
            TtlPolicy::Never => None,
            TtlPolicy::Fixed(d) => Some(*d),
            TtlPolicy::PerEntity(f) => Some(f(entity)),
        }
    }

    /// Policy from an optional number of seconds; `None` or zero means no
    /// expiry.
    pub fn from_seconds(seconds: Option<u64>) -> Self {
        match seconds {
            Some(s) if s > 0 => TtlPolicy::Fixed(Duration::from_secs(s)),
            _ => TtlPolicy::Never,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_hit("key");
        metrics.record_miss("key");
        metrics.record_query("key", Duration::from_millis(3));
    }

    #[test]
    fn test_log_metrics_uses_default_bodies() {
        let metrics = LogMetrics;
        metrics.record_eviction("produtos:{}");
        metrics.record_invalidation("produtos", 3);
    }

    #[test]
    fn test_ttl_policy_never() {
        let policy = TtlPolicy::Never;
        assert_eq!(policy.get_ttl("any"), None);
    }

    #[test]
    fn test_ttl_policy_fixed() {
        let policy = TtlPolicy::Fixed(Duration::from_secs(300));
        assert_eq!(policy.get_ttl("any"), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_ttl_policy_per_entity() {
        let policy = TtlPolicy::PerEntity(|entity| match entity {
            "produtos" => Duration::from_secs(60),
            _ => Duration::from_secs(600),
        });

        assert_eq!(policy.get_ttl("produtos"), Some(Duration::from_secs(60)));
        assert_eq!(policy.get_ttl("receitas"), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_ttl_from_seconds() {
        assert!(matches!(TtlPolicy::from_seconds(None), TtlPolicy::Never));
        assert!(matches!(TtlPolicy::from_seconds(Some(0)), TtlPolicy::Never));
        assert_eq!(
            TtlPolicy::from_seconds(Some(30)).get_ttl("x"),
            Some(Duration::from_secs(30))
        );
    }
}
