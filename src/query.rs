//! Page requests and the parameterized SQL built from them.
//!
//! A [`PageRequest`] arrives from the presentation layer with untrusted
//! values. [`QueryBuilder::normalize`] turns it into a [`NormalizedRequest`]:
//! page numbers clamped, unknown sort and filter keys dropped, search term
//! trimmed. Both the cache key and the SQL are derived from the normalized
//! form, so two requests that produce the same SQL always share a cache entry.
//!
//! # Filter semantics
//!
//! | Filter | SQL |
//! |--------|-----|
//! | `Equals(Scalar::Null)` | `col IS NULL` |
//! | `Equals(v)` | `col = ?` |
//! | `Matches(s)` on a `Prefix` column | `col LIKE 's%' ESCAPE '\'` |
//! | `Matches(s)` on a `Contains` column | `col LIKE '%s%' ESCAPE '\'` |
//! | search term | `(a LIKE '%s%' OR b LIKE '%s%' ...)` over searchable columns |
//!
//! Values are always bound as positional `?` parameters. `build_count` shares
//! the WHERE compilation with `build_select`, so the total and the rows are
//! always filtered the same way.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::columns::{is_identifier, ColumnAllowList, TextMatch};
use crate::error::{Error, Result};

/// Page size used by `PageRequest::default()`.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Upper bound on `page_size` unless configured otherwise.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 500;

/// Bound parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Real(r) => write!(f, "{}", r),
            Scalar::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Integer(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Integer(i64::from(v))
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Integer(i64::from(v))
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Real(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map_or(Scalar::Null, Into::into)
    }
}

/// A filter on one column, chosen explicitly by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Filter {
    /// Equality (or `IS NULL`).
    Equals(Scalar),
    /// Text match; wildcard placement comes from the column's [`TextMatch`].
    Matches(String),
}

impl Filter {
    pub fn equals(value: impl Into<Scalar>) -> Self {
        Filter::Equals(value.into())
    }

    pub fn matches(text: impl Into<String>) -> Self {
        Filter::Matches(text.into())
    }
}

/// Filter mapping keyed by logical column name. The `BTreeMap` keeps keys in
/// canonical order.
pub type Filters = BTreeMap<String, Filter>;

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            other => Err(Error::ValidationError(format!(
                "sort direction must be ASC or DESC, got {:?}",
                other
            ))),
        }
    }
}

/// One paginated query as requested by the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
    #[serde(default)]
    pub sort_column: Option<String>,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub search: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(1, DEFAULT_PAGE_SIZE)
    }
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        PageRequest {
            page,
            page_size,
            sort_column: None,
            sort_direction: SortDirection::Asc,
            filters: Filters::new(),
            search: None,
        }
    }

    pub fn sort_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_column = Some(column.into());
        self.sort_direction = direction;
        self
    }

    pub fn filter(mut self, column: impl Into<String>, filter: Filter) -> Self {
        self.filters.insert(column.into(), filter);
        self
    }

    pub fn with_filters<K, I>(mut self, filters: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Filter)>,
    {
        self.filters
            .extend(filters.into_iter().map(|(k, f)| (k.into(), f)));
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }
}

/// A page request after validation; see [`QueryBuilder::normalize`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedRequest {
    pub page: u32,
    pub page_size: u32,
    pub sort_column: Option<String>,
    pub sort_direction: SortDirection,
    pub filters: Filters,
    pub search: Option<String>,
}

impl NormalizedRequest {
    /// Rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

/// SQL text plus its positional parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<Scalar>,
}

/// Builds SELECT and COUNT statements for one entity's allow-list.
#[derive(Clone, Debug)]
pub struct QueryBuilder<'a> {
    columns: &'a ColumnAllowList,
    select_list: &'a str,
    max_page_size: u32,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(columns: &'a ColumnAllowList) -> Self {
        QueryBuilder {
            columns,
            select_list: "*",
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    /// Projection used by `build_select`. Must be a developer-written constant.
    pub fn with_select_list(mut self, select_list: &'a str) -> Self {
        self.select_list = select_list;
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    /// Validate and canonicalize a request.
    ///
    /// `extra` filters are merged over the request's own filters (same key:
    /// `extra` wins). Page and page size below 1 are clamped to 1.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` when `page_size` exceeds the maximum or a
    /// filter carries a non-finite number.
    pub fn normalize(&self, request: &PageRequest, extra: &Filters) -> Result<NormalizedRequest> {
        let page = clamp_positive(request.page);
        let page_size = clamp_positive(request.page_size);
        if page_size > self.max_page_size {
            return Err(Error::ValidationError(format!(
                "page_size must be at most {}, got {}",
                self.max_page_size, request.page_size
            )));
        }

        let mut filters = Filters::new();
        for (name, filter) in request.filters.iter().chain(extra.iter()) {
            if !self.columns.is_filterable(name) {
                debug!("Dropping filter on undeclared column {:?}", name);
                continue;
            }
            if let Filter::Equals(Scalar::Real(v)) = filter {
                if !v.is_finite() {
                    return Err(Error::ValidationError(format!(
                        "filter {} must be a finite number",
                        name
                    )));
                }
            }
            filters.insert(name.clone(), filter.clone());
        }

        let sort_column = match request.sort_column.as_deref() {
            Some(name) if self.columns.is_sortable(name) => Some(name.to_string()),
            Some(name) => {
                debug!("Ignoring sort on undeclared column {:?}", name);
                None
            }
            None => None,
        };

        let search = request
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(NormalizedRequest {
            page,
            page_size,
            sort_column,
            sort_direction: request.sort_direction,
            filters,
            search,
        })
    }

    /// Data query: `SELECT ... WHERE ... ORDER BY ... LIMIT ? OFFSET ?`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidTable` when `table` is not a plain identifier.
    pub fn build_select(&self, table: &str, request: &NormalizedRequest) -> Result<Query> {
        check_table(table)?;
        let (where_sql, mut params) = self.where_clause(request);

        let sort_expr = request
            .sort_column
            .as_deref()
            .and_then(|name| self.columns.resolve(name).ok())
            .unwrap_or_else(|| self.columns.default_sort_expr());
        let direction = request.sort_direction.as_sql();
        let primary_key = self.columns.primary_key();

        let mut sql = format!("SELECT {} FROM {}{}", self.select_list, table, where_sql);
        if sort_expr == primary_key {
            sql.push_str(&format!(" ORDER BY {} {}", sort_expr, direction));
        } else {
            sql.push_str(&format!(
                " ORDER BY {} {}, {} ASC",
                sort_expr, direction, primary_key
            ));
        }
        sql.push_str(" LIMIT ? OFFSET ?");

        params.push(Scalar::Integer(i64::from(request.page_size)));
        params.push(Scalar::Integer(request.offset() as i64));

        Ok(Query { sql, params })
    }

    /// Total-count query with the same WHERE clause as `build_select`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidTable` when `table` is not a plain identifier.
    pub fn build_count(&self, table: &str, request: &NormalizedRequest) -> Result<Query> {
        check_table(table)?;
        let (where_sql, params) = self.where_clause(request);
        Ok(Query {
            sql: format!("SELECT COUNT(*) FROM {}{}", table, where_sql),
            params,
        })
    }

    fn where_clause(&self, request: &NormalizedRequest) -> (String, Vec<Scalar>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        for (name, filter) in &request.filters {
            // Already dropped by `normalize`; re-checked for hand-built requests.
            let expr = match self.columns.resolve(name) {
                Ok(expr) if self.columns.is_filterable(name) => expr,
                _ => {
                    warn!("Dropping filter on undeclared column {:?}", name);
                    continue;
                }
            };

            match filter {
                Filter::Equals(Scalar::Null) => conditions.push(format!("{} IS NULL", expr)),
                Filter::Equals(value) => {
                    conditions.push(format!("{} = ?", expr));
                    params.push(value.clone());
                }
                Filter::Matches(text) => {
                    let pattern = match self.columns.text_match(name).unwrap_or_default() {
                        TextMatch::Prefix => format!("{}%", escape_like(text)),
                        TextMatch::Contains => format!("%{}%", escape_like(text)),
                    };
                    conditions.push(format!("{} LIKE ? ESCAPE '\\'", expr));
                    params.push(Scalar::Text(pattern));
                }
            }
        }

        if let Some(term) = &request.search {
            let exprs = self.columns.searchable_exprs();
            if !exprs.is_empty() {
                let pattern = format!("%{}%", escape_like(term));
                let group = exprs
                    .iter()
                    .map(|expr| {
                        params.push(Scalar::Text(pattern.clone()));
                        format!("{} LIKE ? ESCAPE '\\'", expr)
                    })
                    .collect::<Vec<_>>()
                    .join(" OR ");
                conditions.push(format!("({})", group));
            }
        }

        if conditions.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), params)
        }
    }
}

fn clamp_positive(value: i64) -> u32 {
    value.clamp(1, i64::from(u32::MAX)) as u32
}

fn check_table(table: &str) -> Result<()> {
    if is_identifier(table) {
        Ok(())
    } else {
        Err(Error::InvalidTable(table.to_string()))
    }
}

/// Escape `LIKE` metacharacters so user text only matches literally.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
