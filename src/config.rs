//! Configuration for the cache, the paging rules and the SQLite store.
//!
//! All settings are plain structs with defaults and `with_*` builders:
//!
//! ```
//! use recipe_ledger::config::{CacheConfig, DataLayerConfig, StoreConfig};
//! use std::time::Duration;
//!
//! let config = DataLayerConfig::default()
//!     .with_cache(CacheConfig::default().with_max_entries(64).with_ttl_seconds(120))
//!     .with_store(StoreConfig::file("data/estoque.sqlite").with_busy_timeout(Duration::from_secs(2)));
//!
//! assert_eq!(config.cache.max_entries, 64);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::observability::TtlPolicy;
use crate::query::DEFAULT_MAX_PAGE_SIZE;

/// Default number of cached pages.
pub const DEFAULT_MAX_ENTRIES: usize = 128;

/// Default time the store waits on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Page cache settings.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Capacity; values below one are treated as one.
    pub max_entries: usize,
    pub ttl: TtlPolicy,
    /// Write cache events to the `log` facade instead of discarding them.
    pub log_events: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: TtlPolicy::Never,
            log_events: false,
        }
    }
}

impl CacheConfig {
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    /// Fixed TTL in seconds; zero disables expiry.
    pub fn with_ttl_seconds(mut self, seconds: u64) -> Self {
        self.ttl = TtlPolicy::from_seconds(Some(seconds));
        self
    }
}

/// Paging rules applied to every request.
#[derive(Clone, Debug)]
pub struct PagingConfig {
    pub max_page_size: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        PagingConfig {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl PagingConfig {
    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }
}

/// Where the SQLite database lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// SQLite store settings.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// How long a statement waits on a locked database before failing with
    /// `Error::StoreTimeout`.
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::memory()
    }
}

impl StoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            location: StoreLocation::File(path.into()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            foreign_keys: true,
        }
    }

    pub fn memory() -> Self {
        StoreConfig {
            location: StoreLocation::Memory,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            foreign_keys: true,
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

/// Complete data-layer configuration.
#[derive(Clone, Debug, Default)]
pub struct DataLayerConfig {
    pub cache: CacheConfig,
    pub paging: PagingConfig,
    pub store: StoreConfig,
}

impl DataLayerConfig {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_paging(mut self, paging: PagingConfig) -> Self {
        self.paging = paging;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }
}
