//! A page of query results.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::Record;

/// One page of rows plus the pagination totals.
///
/// Immutable once built. The cache hands out `Arc<PageResult>`, so every
/// reader of a cached page sees the same value. Decoding ignores
/// `total_paginas` and derives it from the other totals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "PageWire")]
pub struct PageResult {
    #[serde(rename = "itens")]
    rows: Vec<Record>,
    #[serde(rename = "colunas")]
    columns: Vec<String>,
    #[serde(rename = "pagina")]
    page: u32,
    #[serde(rename = "por_pagina")]
    page_size: u32,
    #[serde(rename = "total_itens")]
    total_items: u64,
    #[serde(rename = "total_paginas")]
    total_pages: u64,
}

#[derive(Deserialize)]
struct PageWire {
    #[serde(rename = "itens")]
    rows: Vec<Record>,
    #[serde(rename = "colunas")]
    columns: Vec<String>,
    #[serde(rename = "pagina")]
    page: u32,
    #[serde(rename = "por_pagina")]
    page_size: u32,
    #[serde(rename = "total_itens")]
    total_items: u64,
}

impl From<PageWire> for PageResult {
    fn from(wire: PageWire) -> Self {
        PageResult::new(wire.rows, wire.columns, wire.page, wire.page_size, wire.total_items)
    }
}

impl PageResult {
    pub fn new(rows: Vec<Record>, columns: Vec<String>, page: u32, page_size: u32, total_items: u64) -> Self {
        PageResult {
            rows,
            columns,
            page,
            page_size,
            total_items,
            total_pages: total_pages(total_items, page_size),
        }
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_items(&self) -> u64 {
        self.total_items
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Decode the rows into entity value objects.
    ///
    /// # Errors
    ///
    /// `Error::SerializationError` if a row does not match `T`.
    pub fn rows_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.rows
            .iter()
            .map(|row| Ok(serde_json::from_value(serde_json::Value::Object(row.clone()))?))
            .collect()
    }
}

/// `ceil(total_items / page_size)`, never less than one page.
pub fn total_pages(total_items: u64, page_size: u32) -> u64 {
    let page_size = u64::from(page_size.max(1));
    total_items.div_ceil(page_size).max(1)
}
