//! # recipe-ledger
//!
//! Paginated, cached data-access layer for an inventory and recipe manager.
//!
//! ## Features
//!
//! - **Safe dynamic SQL:** sort and filter identifiers come from a per-entity
//!   allow-list; every value is a bound parameter
//! - **Page cache:** bounded, optionally expiring, keyed by a canonical request
//!   signature so equal requests always share an entry
//! - **Derived costs:** recipe costs are recomputed from ingredient lines and
//!   product prices after every relevant mutation
//! - **Uniform envelopes:** every boundary call returns
//!   `{ok, mensagem, status, dados}` instead of raising
//!
//! ## Quick Start
//!
//! ```no_run
//! use recipe_ledger::{DataHandler, DataLayerConfig, Filter, Filters, PageRequest, SortDirection};
//!
//! # async fn run() -> recipe_ledger::Result<()> {
//! let handler = DataHandler::open(&DataLayerConfig::default()).await?;
//!
//! let request = PageRequest::new(2, 20)
//!     .sort_by("nome", SortDirection::Asc)
//!     .filter("categoria_id", Filter::equals(3));
//!
//! let envelope = handler.list_products(&request, &Filters::new()).await;
//! if let Some(page) = envelope.into_data() {
//!     println!("{} of {} pages", page.page(), page.total_pages());
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod cache;
pub mod columns;
pub mod config;
pub mod cost;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod key;
pub mod observability;
pub mod page;
pub mod query;
pub mod repository;
pub mod schema;
pub mod store;
pub mod strategy;

// Re-exports for convenience
pub use cache::PageCache;
pub use columns::ColumnAllowList;
pub use config::DataLayerConfig;
pub use cost::CostAggregator;
pub use entity::PagedEntity;
pub use envelope::{ResultEnvelope, Status};
pub use error::{Error, Result};
pub use handler::DataHandler;
pub use key::CacheKey;
pub use page::PageResult;
pub use query::{Filter, Filters, PageRequest, Scalar, SortDirection};
pub use repository::PagedRepository;
pub use store::RelationalStore;
pub use strategy::CacheStrategy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
