//! Cache strategies for page loads.
//!
//! Every page load uses one of four strategies:
//!
//! ```
//! use recipe_ledger::strategy::CacheStrategy;
//!
//! // 1. Refresh - cache first, store on miss (default)
//! let _s = CacheStrategy::Refresh;
//!
//! // 2. Fresh - cache only
//! let _s = CacheStrategy::Fresh;
//!
//! // 3. Invalidate - drop the cached page, then reload it
//! let _s = CacheStrategy::Invalidate;
//!
//! // 4. Bypass - always query the store
//! let _s = CacheStrategy::Bypass;
//! ```
//!
//! | Strategy | Cache Hit | Cache Miss | Use Case |
//! |----------|-----------|-----------|----------|
//! | **Refresh** | Return | Query + store | Default list views |
//! | **Fresh** | Return | 404 envelope | Redraws that must not touch the store |
//! | **Invalidate** | Drop, query + store | Query + store | "Reload" button |
//! | **Bypass** | Ignore, query + store | Query + store | Reports that need current totals |

/// Strategy enum controlling page cache behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// **Fresh**: cached page only, no store access.
    Fresh,

    /// **Refresh**: cached page if present, otherwise query and store.
    #[default]
    Refresh,

    /// **Invalidate**: drop this page's entry, query and store again.
    Invalidate,

    /// **Bypass**: query regardless of the cache; the result still replaces
    /// the cached page.
    Bypass,
}

impl std::fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStrategy::Fresh => write!(f, "Fresh"),
            CacheStrategy::Refresh => write!(f, "Refresh"),
            CacheStrategy::Invalidate => write!(f, "Invalidate"),
            CacheStrategy::Bypass => write!(f, "Bypass"),
        }
    }
}
