//! Per-entity allow-list of column identifiers.
//!
//! Parameter binding protects filter *values*, but column and table names have
//! to be interpolated into the SQL text. The allow-list is the only place such
//! identifiers come from: a logical field name is accepted when it matches the
//! identifier pattern and was declared for the entity, and it resolves to a
//! column expression written by the developer, never by the caller.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Whether `name` is a plain SQL identifier (letters, digits, underscore; not
/// starting with a digit).
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Wildcard placement for `Filter::Matches` on a column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextMatch {
    /// `LIKE 'value%'`
    #[default]
    Prefix,
    /// `LIKE '%value%'` (free-text fields)
    Contains,
}

/// One declared column.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ColumnSpec {
    name: &'static str,
    expr: &'static str,
    sortable: bool,
    filterable: bool,
    searchable: bool,
    text_match: TextMatch,
}

/// Declared column set for one entity.
///
/// # Example
///
/// ```
/// use recipe_ledger::columns::{ColumnAllowList, TextMatch};
///
/// let columns = ColumnAllowList::new("id")
///     .column("id", "id")
///     .text_column("nome", "nome", TextMatch::Contains)
///     .searchable("nome")
///     .default_sort("nome");
///
/// assert_eq!(columns.resolve("nome").unwrap(), "nome");
/// assert!(!columns.is_allowed("nome; DROP TABLE produtos"));
/// ```
#[derive(Clone, Debug)]
pub struct ColumnAllowList {
    columns: Vec<ColumnSpec>,
    primary_key: &'static str,
    default_sort: Option<&'static str>,
}

impl ColumnAllowList {
    /// Start an allow-list whose tie-breaker and fallback sort is
    /// `primary_key`.
    pub fn new(primary_key: &'static str) -> Self {
        ColumnAllowList {
            columns: Vec::new(),
            primary_key,
            default_sort: None,
        }
    }

    /// Declare a sortable, filterable column matched by prefix.
    pub fn column(self, name: &'static str, expr: &'static str) -> Self {
        self.text_column(name, expr, TextMatch::Prefix)
    }

    /// Declare a sortable, filterable column with an explicit text-match policy.
    pub fn text_column(mut self, name: &'static str, expr: &'static str, text_match: TextMatch) -> Self {
        self.columns.retain(|c| c.name != name);
        self.columns.push(ColumnSpec {
            name,
            expr,
            sortable: true,
            filterable: true,
            searchable: false,
            text_match,
        });
        self
    }

    /// Declare a column usable as a filter but not as a sort key.
    pub fn filter_only(mut self, name: &'static str, expr: &'static str) -> Self {
        self.columns.retain(|c| c.name != name);
        self.columns.push(ColumnSpec {
            name,
            expr,
            sortable: false,
            filterable: true,
            searchable: false,
            text_match: TextMatch::Prefix,
        });
        self
    }

    /// Include an already declared column in the free-text search group.
    pub fn searchable(mut self, name: &'static str) -> Self {
        if let Some(spec) = self.columns.iter_mut().find(|c| c.name == name) {
            spec.searchable = true;
        }
        self
    }

    /// Sort column used when the request names none or an unknown one.
    pub fn default_sort(mut self, name: &'static str) -> Self {
        self.default_sort = Some(name);
        self
    }

    fn lookup(&self, name: &str) -> Option<&ColumnSpec> {
        if !is_identifier(name) {
            return None;
        }
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether `name` is a declared column.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn is_sortable(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|c| c.sortable)
    }

    pub fn is_filterable(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|c| c.filterable)
    }

    /// Column expression for `name`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidColumn` for anything not declared or not an identifier.
    pub fn resolve(&self, name: &str) -> Result<&'static str> {
        self.lookup(name)
            .map(|c| c.expr)
            .ok_or_else(|| Error::InvalidColumn(name.to_string()))
    }

    /// Text-match policy of a declared column.
    pub fn text_match(&self, name: &str) -> Option<TextMatch> {
        self.lookup(name).map(|c| c.text_match)
    }

    /// Expressions of every searchable column, in declaration order.
    pub fn searchable_exprs(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| c.searchable)
            .map(|c| c.expr)
            .collect()
    }

    /// Expression of the primary key.
    pub fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    /// Expression of the default sort column, falling back to the primary key.
    pub fn default_sort_expr(&self) -> &'static str {
        self.default_sort
            .and_then(|name| self.lookup(name))
            .map(|c| c.expr)
            .unwrap_or(self.primary_key)
    }
}
