//! Cache key management utilities.

use std::fmt;

use crate::error::Result;
use crate::query::NormalizedRequest;

/// Canonical identifier of one cached page.
///
/// Format: `"{entity}:{signature}"`, where the signature is the JSON encoding
/// of the normalized request. Filters live in a `BTreeMap`, so the encoding
/// (and therefore the key) does not depend on the order filters were added.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    entity: String,
    text: String,
}

impl CacheKey {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builder for cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Build the page key for `entity` from a normalized request.
    ///
    /// # Errors
    ///
    /// `Error::SerializationError` if the request cannot be encoded.
    pub fn for_page(entity: &str, request: &NormalizedRequest) -> Result<CacheKey> {
        let signature = serde_json::to_string(request)?;
        Ok(CacheKey {
            entity: entity.to_string(),
            text: Self::build_composite(&[entity, &signature]),
        })
    }

    /// Prefix shared by every key of `entity`, for bulk invalidation.
    pub fn entity_prefix(entity: &str) -> String {
        format!("{}:", entity)
    }

    /// Build composite key from multiple parts.
    pub fn build_composite(parts: &[&str]) -> String {
        parts.join(":")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{ColumnAllowList, TextMatch};
    use crate::query::{Filter, Filters, PageRequest, QueryBuilder, SortDirection};

    fn columns() -> ColumnAllowList {
        ColumnAllowList::new("id")
            .column("id", "id")
            .text_column("nome", "nome", TextMatch::Contains)
            .column("categoria_id", "categoria_id")
    }

    fn key_for(request: &PageRequest) -> CacheKey {
        let columns = columns();
        let normalized = QueryBuilder::new(&columns)
            .normalize(request, &Filters::new())
            .unwrap();
        CacheKeyBuilder::for_page("receitas", &normalized).unwrap()
    }

    #[test]
    fn test_filter_order_does_not_change_key() {
        let a = PageRequest::new(1, 20)
            .filter("nome", Filter::matches("bolo"))
            .filter("categoria_id", Filter::equals(1));
        let b = PageRequest::new(1, 20)
            .filter("categoria_id", Filter::equals(1))
            .filter("nome", Filter::matches("bolo"));
        assert_eq!(key_for(&a), key_for(&b));
    }

    #[test]
    fn test_dropped_fields_do_not_change_key() {
        let plain = PageRequest::new(0, 20);
        let noisy = PageRequest::new(1, 20)
            .filter("not_a_column", Filter::equals(9))
            .sort_by("not_a_column", SortDirection::Asc)
            .search("  ");
        assert_eq!(key_for(&plain), key_for(&noisy));
    }

    #[test]
    fn test_distinct_requests_get_distinct_keys() {
        let base = PageRequest::new(1, 20);
        assert_ne!(key_for(&base), key_for(&PageRequest::new(2, 20)));
        assert_ne!(key_for(&base), key_for(&PageRequest::new(1, 10)));
        assert_ne!(
            key_for(&base),
            key_for(&base.clone().sort_by("nome", SortDirection::Desc))
        );
        assert_ne!(
            key_for(&base.clone().filter("categoria_id", Filter::equals(3))),
            key_for(&base.clone().filter("categoria_id", Filter::equals("3")))
        );
    }

    #[test]
    fn test_key_is_namespaced_by_entity() {
        let key = key_for(&PageRequest::default());
        assert_eq!(key.entity(), "receitas");
        assert!(key.as_str().starts_with(&CacheKeyBuilder::entity_prefix("receitas")));
        assert_eq!(key.to_string(), key.as_str());
    }

    #[test]
    fn test_composite_key_builder() {
        let key = CacheKeyBuilder::build_composite(&["produtos", "1", "20"]);
        assert_eq!(key, "produtos:1:20");
    }
}
