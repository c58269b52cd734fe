//! Relational store client abstraction.
//!
//! The data-access layer talks to the database only through
//! [`RelationalStore`]: positional `?` placeholders, one statement per call,
//! autocommit. Rows come back as field-name-keyed [`Record`]s.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::error::Result;
use crate::query::{Query, Scalar};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// One row keyed by column name.
pub type Record = serde_json::Map<String, Value>;

/// Outcome of a write statement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub affected_rows: usize,
    /// Row id of the most recent successful INSERT on the connection.
    pub last_insert_id: i64,
}

/// Rows returned by a query, with the column names in SELECT order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Record> {
        self.rows.first()
    }
}

/// Trait for relational store clients.
///
/// **IMPORTANT:** All methods use `&self`. Implementations serialize access
/// internally (the SQLite client keeps its connection behind a mutex).
///
/// **ASYNC:** All methods are async and must be awaited. Each call runs one
/// statement to completion; there is no cancellation and no retry.
#[allow(async_fn_in_trait)]
pub trait RelationalStore: Send + Sync {
    /// Run a write statement.
    ///
    /// # Errors
    /// Returns `Err` on constraint violations, busy timeouts and driver errors.
    async fn execute(&self, sql: &str, params: &[Scalar]) -> Result<ExecOutcome>;

    /// Run a query and collect every row.
    ///
    /// # Errors
    /// Returns `Err` if the statement fails to prepare or run.
    async fn fetch_all(&self, sql: &str, params: &[Scalar]) -> Result<RowSet>;

    /// First column of the first row, `None` when the query yields no rows.
    ///
    /// Default implementation calls `fetch_all()`.
    ///
    /// # Errors
    /// Returns `Err` if the statement fails to prepare or run.
    async fn fetch_scalar(&self, sql: &str, params: &[Scalar]) -> Result<Option<Value>> {
        let rows = self.fetch_all(sql, params).await?;
        let first = rows
            .first()
            .and_then(|row| rows.columns.first().and_then(|c| row.get(c)).cloned());
        Ok(first)
    }

    /// Health check - verify the store answers a trivial query.
    ///
    /// # Errors
    /// Returns `Err` if the store is not accessible
    async fn health_check(&self) -> Result<bool> {
        Ok(self.fetch_scalar("SELECT 1", &[]).await?.is_some())
    }
}

/// Convenience for running a built [`Query`].
#[allow(async_fn_in_trait)]
pub trait QueryExt: RelationalStore {
    async fn fetch_query(&self, query: &Query) -> Result<RowSet> {
        self.fetch_all(&query.sql, &query.params).await
    }

    async fn scalar_query(&self, query: &Query) -> Result<Option<Value>> {
        self.fetch_scalar(&query.sql, &query.params).await
    }
}

impl<S: RelationalStore + ?Sized> QueryExt for S {}

/// Store wrapper that counts calls per operation.
///
/// Used to verify that cache hits never reach the store, and to report
/// round-trips in diagnostics.
///
/// # Example
///
/// ```
/// use recipe_ledger::store::{CountingStore, SqliteStore};
///
/// let store = CountingStore::new(SqliteStore::open_in_memory().unwrap());
/// assert_eq!(store.calls(), 0);
/// ```
#[derive(Debug, Default)]
pub struct CountingStore<S> {
    inner: S,
    executes: AtomicUsize,
    fetches: AtomicUsize,
    scalars: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        CountingStore {
            inner,
            executes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            scalars: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn scalars(&self) -> usize {
        self.scalars.load(Ordering::SeqCst)
    }

    /// `fetch_all` plus `fetch_scalar` calls.
    pub fn reads(&self) -> usize {
        self.fetches() + self.scalars()
    }

    pub fn calls(&self) -> usize {
        self.executes() + self.reads()
    }

    pub fn reset(&self) {
        self.executes.store(0, Ordering::SeqCst);
        self.fetches.store(0, Ordering::SeqCst);
        self.scalars.store(0, Ordering::SeqCst);
    }
}

impl<S: RelationalStore> RelationalStore for CountingStore<S> {
    async fn execute(&self, sql: &str, params: &[Scalar]) -> Result<ExecOutcome> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(sql, params).await
    }

    async fn fetch_all(&self, sql: &str, params: &[Scalar]) -> Result<RowSet> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_all(sql, params).await
    }

    async fn fetch_scalar(&self, sql: &str, params: &[Scalar]) -> Result<Option<Value>> {
        self.scalars.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_scalar(sql, params).await
    }
}
