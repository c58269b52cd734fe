//! Property-based tests for cache keys and pagination arithmetic.
//!
//! # Properties Tested
//!
//! 1. **Determinism Property**: the same filters added in any order give the
//!    same cache key
//! 2. **Allow-list Property**: undeclared filter keys never change the key
//! 3. **Page Count Property**: `total_pages` covers every row with no empty
//!    trailing page
//! 4. **Escape Property**: escaped LIKE text has no bare wildcard

use proptest::prelude::*;
use recipe_ledger::entity::{PagedEntity, Product};
use recipe_ledger::key::{CacheKey, CacheKeyBuilder};
use recipe_ledger::page::total_pages;
use recipe_ledger::query::{escape_like, QueryBuilder};
use recipe_ledger::{Filter, Filters, PageRequest, Scalar, SortDirection};

const DECLARED: &[&str] = &["id", "nome", "categoria_id", "unidade", "custo_unitario", "estoque"];

fn filter_strategy() -> impl Strategy<Value = Filter> {
    prop_oneof![
        any::<i64>().prop_map(|v| Filter::Equals(Scalar::Integer(v))),
        "[a-zA-Z0-9 %_]{0,12}".prop_map(Filter::Matches),
        Just(Filter::Equals(Scalar::Null)),
        any::<bool>().prop_map(|b| Filter::Equals(Scalar::Bool(b))),
    ]
}

fn declared_filters() -> impl Strategy<Value = Vec<(String, Filter)>> {
    prop::sample::subsequence(DECLARED, 0..=DECLARED.len()).prop_flat_map(|names| {
        let len = names.len();
        (Just(names), prop::collection::vec(filter_strategy(), len)).prop_map(|(names, filters)| {
            names
                .into_iter()
                .map(str::to_string)
                .zip(filters)
                .collect::<Vec<_>>()
        })
    })
}

fn key_for(request: &PageRequest) -> CacheKey {
    let normalized = QueryBuilder::new(Product::columns())
        .normalize(request, &Filters::new())
        .expect("valid request");
    CacheKeyBuilder::for_page(Product::entity_name(), &normalized).expect("key")
}

fn request_from(entries: &[(String, Filter)], page: i64, size: i64) -> PageRequest {
    PageRequest::new(page, size)
        .sort_by("nome", SortDirection::Desc)
        .with_filters(entries.iter().cloned())
}

proptest! {
    #[test]
    fn prop_key_ignores_filter_order(
        (entries, shuffled) in declared_filters()
            .prop_flat_map(|entries| (Just(entries.clone()), Just(entries).prop_shuffle())),
        page in 1i64..1000,
        size in 1i64..=500,
    ) {
        let a = key_for(&request_from(&entries, page, size));
        let b = key_for(&request_from(&shuffled, page, size));
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_undeclared_keys_do_not_change_key(
        entries in declared_filters(),
        junk in "[a-z]{1,6}[;= ][a-zA-Z0-9 ;=]{0,10}",
        value in filter_strategy(),
    ) {
        let clean = request_from(&entries, 1, 20);
        let noisy = clean.clone().filter(junk, value);
        prop_assert_eq!(key_for(&clean), key_for(&noisy));
    }

    #[test]
    fn prop_distinct_pages_get_distinct_keys(page in 1i64..10_000, size in 1i64..=500) {
        let here = key_for(&PageRequest::new(page, size));
        let next = key_for(&PageRequest::new(page + 1, size));
        prop_assert_ne!(here, next);
    }

    #[test]
    fn prop_total_pages_covers_all_rows(total in 0u64..1_000_000, size in 1u32..=500) {
        let pages = total_pages(total, size);
        prop_assert!(pages >= 1);
        prop_assert!(pages * u64::from(size) >= total);
        if total > 0 {
            prop_assert!((pages - 1) * u64::from(size) < total);
        }
    }

    #[test]
    fn prop_escaped_text_has_no_bare_wildcards(text in "[a-z%_\\\\]{0,20}") {
        let escaped = escape_like(&text);
        let mut chars = escaped.chars();
        let mut unescaped = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => unescaped.push(chars.next().expect("escape is followed by a char")),
                '%' | '_' => prop_assert!(false, "bare wildcard in {:?}", escaped),
                other => unescaped.push(other),
            }
        }
        prop_assert_eq!(unescaped, text);
    }
}
