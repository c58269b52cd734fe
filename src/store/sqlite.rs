//! SQLite store client.
//!
//! One `rusqlite::Connection` behind a `parking_lot::Mutex`. Statements run
//! synchronously inside the async methods, which matches the single dispatch
//! loop the data layer is driven from.

use std::fmt;
use std::time::Instant;

use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use serde_json::{Number, Value};

use super::{ExecOutcome, Record, RelationalStore, RowSet};
use crate::config::{StoreConfig, StoreLocation};
use crate::error::Result;
use crate::query::Scalar;

impl ToSql for Scalar {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Scalar::Null => ToSqlOutput::Owned(SqlValue::Null),
            Scalar::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Scalar::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Scalar::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            Scalar::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// SQLite-backed [`RelationalStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    location: StoreLocation,
}

impl SqliteStore {
    /// Open the database described by `config`.
    ///
    /// Applies the busy timeout and the `foreign_keys` pragma.
    ///
    /// # Errors
    ///
    /// `Error::StoreUnavailable` if the file cannot be opened.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let conn = match &config.location {
            StoreLocation::File(path) => Connection::open(path)?,
            StoreLocation::Memory => Connection::open_in_memory()?,
        };
        conn.busy_timeout(config.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;

        info!(
            "✓ SQLite store opened ({:?}, busy timeout {:?})",
            config.location, config.busy_timeout
        );

        Ok(SqliteStore {
            conn: Mutex::new(conn),
            location: config.location.clone(),
        })
    }

    /// Private in-memory database with default settings.
    pub fn open_in_memory() -> Result<Self> {
        SqliteStore::open(&StoreConfig::memory())
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Run several `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl RelationalStore for SqliteStore {
    async fn execute(&self, sql: &str, params: &[Scalar]) -> Result<ExecOutcome> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let affected_rows = conn.execute(sql, params_from_iter(params.iter()))?;
        let outcome = ExecOutcome {
            affected_rows,
            last_insert_id: conn.last_insert_rowid(),
        };
        trace!("SQLite EXEC {} ({} rows, {:?})", sql, affected_rows, start.elapsed());
        Ok(outcome)
    }

    async fn fetch_all(&self, sql: &str, params: &[Scalar]) -> Result<RowSet> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (idx, name) in columns.iter().enumerate() {
                record.insert(name.clone(), to_json(row.get_ref(idx)?));
            }
            records.push(record);
        }

        trace!("SQLite QUERY {} ({} rows, {:?})", sql, records.len(), start.elapsed());
        Ok(RowSet {
            columns,
            rows: records,
        })
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(r) => Number::from_f64(r).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}
