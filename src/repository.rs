//! Generic paged, cached repository.
//!
//! One `PagedRepository<E, S>` serves every listable entity: the entity
//! supplies its table, allow-list and projection through [`PagedEntity`], the
//! repository supplies normalization, cache lookup and the SELECT + COUNT
//! round-trip.
//!
//! # Page lifecycle
//!
//! ```text
//! absent ──(miss, query ok)──▶ populated ──(invalidate | TTL | eviction)──▶ absent
//! ```
//!
//! There is no "being computed" state. Two identical misses issued back to
//! back both query the store.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::cache::PageCache;
use crate::config::PagingConfig;
use crate::entity::PagedEntity;
use crate::envelope::{ResultEnvelope, Status};
use crate::error::{Error, Result};
use crate::key::{CacheKey, CacheKeyBuilder};
use crate::page::PageResult;
use crate::query::{Filters, NormalizedRequest, PageRequest, QueryBuilder, Scalar};
use crate::store::{QueryExt, RelationalStore};
use crate::strategy::CacheStrategy;

/// Paged access to one entity through a shared page cache.
pub struct PagedRepository<E, S> {
    store: Arc<S>,
    cache: Arc<PageCache>,
    paging: PagingConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E: PagedEntity, S: RelationalStore> PagedRepository<E, S> {
    pub fn new(store: Arc<S>, cache: Arc<PageCache>, paging: PagingConfig) -> Self {
        PagedRepository {
            store,
            cache,
            paging,
            _entity: PhantomData,
        }
    }

    pub fn entity_name(&self) -> &'static str {
        E::entity_name()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    fn query_builder(&self) -> QueryBuilder<'static> {
        QueryBuilder::new(E::columns())
            .with_select_list(E::select_list())
            .with_max_page_size(self.paging.max_page_size)
    }

    /// Load one page with the default `Refresh` strategy, wrapped in an
    /// envelope. Never returns an error across the boundary.
    pub async fn list_page(&self, request: &PageRequest, extra: &Filters) -> ResultEnvelope<Arc<PageResult>> {
        self.list_page_with(request, extra, CacheStrategy::Refresh).await
    }

    /// Load one page with an explicit cache strategy.
    ///
    /// A `Fresh` miss yields a 404 envelope.
    pub async fn list_page_with(
        &self,
        request: &PageRequest,
        extra: &Filters,
        strategy: CacheStrategy,
    ) -> ResultEnvelope<Arc<PageResult>> {
        match self.fetch_page(request, extra, strategy).await {
            Ok(Some(page)) => {
                let message = format!("Page {} of {} loaded", page.page(), page.total_pages());
                ResultEnvelope::success(page, message)
            }
            Ok(None) => ResultEnvelope::failure(
                Status::NotFound,
                format!("Page of {} is not cached", E::entity_name()),
            ),
            Err(e) => ResultEnvelope::from_error(&e),
        }
    }

    /// Load one page, honoring `strategy`.
    ///
    /// # Returns
    /// - `Ok(Some(page))` - served from cache or freshly queried
    /// - `Ok(None)` - `Fresh` strategy and the page is not cached
    ///
    /// # Errors
    /// `ValidationError` for a bad request, store errors otherwise.
    pub async fn fetch_page(
        &self,
        request: &PageRequest,
        extra: &Filters,
        strategy: CacheStrategy,
    ) -> Result<Option<Arc<PageResult>>> {
        let builder = self.query_builder();
        let normalized = builder.normalize(request, extra)?;
        let key = CacheKeyBuilder::for_page(E::entity_name(), &normalized)?;

        debug!("» Page load for {} (strategy: {})", key, strategy);

        match strategy {
            CacheStrategy::Fresh => {
                let cached = self.cache.get(&key);
                if cached.is_none() {
                    debug!("✗ Cache miss (Fresh strategy) - no fallback");
                }
                return Ok(cached);
            }
            CacheStrategy::Refresh => {
                if let Some(page) = self.cache.get(&key) {
                    debug!("✓ Cache hit (Refresh strategy)");
                    return Ok(Some(page));
                }
                debug!("Cache miss, falling back to store");
            }
            CacheStrategy::Invalidate => {
                self.cache.invalidate(&key);
                debug!("✓ Cache invalidated for {}", key);
            }
            CacheStrategy::Bypass => {
                debug!("Bypassing cache for {}", key);
            }
        }

        let page = self.query_page(&builder, &normalized, &key).await?;
        Ok(Some(self.cache.put(key, page)))
    }

    async fn query_page(
        &self,
        builder: &QueryBuilder<'static>,
        request: &NormalizedRequest,
        key: &CacheKey,
    ) -> Result<PageResult> {
        let timer = Instant::now();
        let result = self.run_page_queries(builder, request).await;

        match &result {
            Ok(page) => {
                self.cache.metrics().record_query(key.as_str(), timer.elapsed());
                debug!(
                    "✓ {} page {} queried: {} rows of {} in {:?}",
                    E::entity_name(),
                    page.page(),
                    page.rows().len(),
                    page.total_items(),
                    timer.elapsed()
                );
            }
            Err(e) => self.cache.metrics().record_error(key.as_str(), &e.to_string()),
        }
        result
    }

    async fn run_page_queries(&self, builder: &QueryBuilder<'static>, request: &NormalizedRequest) -> Result<PageResult> {
        let select = builder.build_select(E::table(), request)?;
        let count = builder.build_count(E::table(), request)?;

        let rows = self.store.fetch_query(&select).await?;
        let total = match self.store.scalar_query(&count).await? {
            Some(value) => count_from_json(&value)?,
            None => 0,
        };

        Ok(PageResult::new(
            rows.rows,
            rows.columns,
            request.page,
            request.page_size,
            total,
        ))
    }

    /// Fetch one entity by primary key, bypassing the page cache.
    ///
    /// # Errors
    /// Store errors, or `SerializationError` if the row does not decode.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<E>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            E::select_list(),
            E::table(),
            E::columns().primary_key()
        );
        let rows = self.store.fetch_all(&sql, &[Scalar::Integer(id)]).await?;

        match rows.rows.into_iter().next() {
            Some(row) => {
                let entity: E = serde_json::from_value(Value::Object(row))?;
                entity.validate()?;
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    /// Like `find_by_id`, but a missing row is `Error::NotFound`.
    pub async fn get_by_id(&self, id: i64) -> Result<E> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {} does not exist", E::entity_name(), id)))
    }

    /// Drop every cached page of this entity. Returns how many were removed.
    pub fn invalidate_cache(&self) -> usize {
        let removed = self
            .cache
            .clear_matching(&CacheKeyBuilder::entity_prefix(E::entity_name()));
        debug!("✓ {} cache invalidated ({} pages)", E::entity_name(), removed);
        removed
    }
}

fn count_from_json(value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| Error::SerializationError(format!("unexpected row count {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Product;
    use crate::query::{Filter, SortDirection};
    use crate::schema::ensure_schema;
    use crate::store::{CountingStore, SqliteStore};

    type Repo = PagedRepository<Product, CountingStore<SqliteStore>>;

    async fn seeded(products: usize) -> Repo {
        let store = CountingStore::new(SqliteStore::open_in_memory().expect("open"));
        ensure_schema(&store).await.expect("schema");
        for n in 1..=products {
            store
                .execute(
                    "INSERT INTO produtos (nome, categoria_id, custo_unitario) VALUES (?, ?, ?)",
                    &[
                        Scalar::Text(format!("Produto {:02}", n)),
                        Scalar::Integer(if n % 2 == 0 { 2 } else { 1 }),
                        Scalar::from("1.25"),
                    ],
                )
                .await
                .expect("insert");
        }
        store.reset();
        PagedRepository::new(Arc::new(store), Arc::new(PageCache::default()), PagingConfig::default())
    }

    #[tokio::test]
    async fn test_second_identical_request_is_served_from_cache() {
        let repo = seeded(5).await;
        let request = PageRequest::new(1, 2).sort_by("nome", SortDirection::Asc);

        let first = repo.list_page(&request, &Filters::new()).await;
        assert!(first.is_ok());
        assert_eq!(repo.store().reads(), 2);

        let second = repo.list_page(&request, &Filters::new()).await;
        assert_eq!(repo.store().reads(), 2);
        assert_eq!(first.data, second.data);

        let page = second.into_data().expect("page");
        assert_eq!(page.total_items(), 5);
        assert_eq!(page.total_pages(), 3);
        assert_eq!(page.rows()[0]["nome"], Value::from("Produto 01"));
    }

    #[tokio::test]
    async fn test_invalidate_forces_requery() {
        let repo = seeded(3).await;
        let request = PageRequest::default();

        repo.list_page(&request, &Filters::new()).await;
        assert_eq!(repo.invalidate_cache(), 1);
        repo.list_page(&request, &Filters::new()).await;
        assert_eq!(repo.store().reads(), 4);
    }

    #[tokio::test]
    async fn test_fresh_miss_is_not_found() {
        let repo = seeded(3).await;
        let envelope = repo
            .list_page_with(&PageRequest::default(), &Filters::new(), CacheStrategy::Fresh)
            .await;

        assert!(!envelope.is_ok());
        assert_eq!(envelope.status(), Some(Status::NotFound));
        assert_eq!(repo.store().calls(), 0);
    }

    #[tokio::test]
    async fn test_bypass_and_invalidate_always_query() {
        let repo = seeded(3).await;
        let request = PageRequest::default();

        repo.list_page(&request, &Filters::new()).await;
        repo.list_page_with(&request, &Filters::new(), CacheStrategy::Bypass).await;
        repo.list_page_with(&request, &Filters::new(), CacheStrategy::Invalidate).await;
        assert_eq!(repo.store().reads(), 6);

        let cached = repo
            .list_page_with(&request, &Filters::new(), CacheStrategy::Fresh)
            .await;
        assert!(cached.is_ok());
        assert_eq!(repo.store().reads(), 6);
    }

    #[tokio::test]
    async fn test_extra_filters_narrow_the_page() {
        let repo = seeded(6).await;
        let mut extra = Filters::new();
        extra.insert("categoria_id".into(), Filter::equals(2));

        let page = repo
            .list_page(&PageRequest::default(), &extra)
            .await
            .into_data()
            .expect("page");
        assert_eq!(page.total_items(), 3);

        let products: Vec<Product> = page.rows_as().expect("typed rows");
        assert!(products.iter().all(|p| p.category_id == Some(2)));
    }

    #[tokio::test]
    async fn test_oversized_page_is_bad_request() {
        let repo = seeded(1).await;
        let envelope = repo
            .list_page(&PageRequest::new(1, 10_000), &Filters::new())
            .await;
        assert_eq!(envelope.status(), Some(Status::BadRequest));
        assert_eq!(repo.store().calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_becomes_error_envelope() {
        let store = CountingStore::new(SqliteStore::open_in_memory().expect("open"));
        let repo: Repo = PagedRepository::new(
            Arc::new(store),
            Arc::new(PageCache::default()),
            PagingConfig::default(),
        );

        // No schema: the SELECT fails.
        let envelope = repo.list_page(&PageRequest::default(), &Filters::new()).await;
        assert!(!envelope.is_ok());
        assert_eq!(envelope.status(), Some(Status::InternalError));
        assert!(!envelope.message.contains("SELECT"));
        assert!(repo.cache().is_empty());
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let repo = seeded(2).await;
        let product = repo.find_by_id(2).await.expect("find").expect("exists");
        assert_eq!(product.name, "Produto 02");
        assert_eq!(product.unit, "un");

        assert!(repo.find_by_id(99).await.expect("find").is_none());
        assert!(matches!(repo.get_by_id(99).await, Err(Error::NotFound(_))));
    }
}
