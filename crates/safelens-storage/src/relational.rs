//! Relational store access for query execution.
//!
//! Every call acquires its own connection immediately before running the
//! query and releases it before returning, on success and on error alike.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Number, Value};
use tracing::debug;

use safelens_core::Row;

use crate::error::StoreError;

/// A relational store that runs one query per call.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Execute `sql` once and materialize every returned row.
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, StoreError>;
}

// =============================================================================
// SqliteStore
// =============================================================================

/// SQLite-backed store opening a fresh connection per query.
///
/// The database file must already exist; a missing file is reported as a
/// connection failure rather than silently creating an empty database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RelationalStore for SqliteStore {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let path = self.path.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || run_sqlite_query(&path, &sql))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn run_sqlite_query(path: &Path, sql: &str) -> Result<Vec<Row>, StoreError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| StoreError::Connect(e.to_string()))?;

    // `conn` is dropped (and closed) when this function returns on any path.
    let rows = query_all(&conn, sql)?;
    debug!(rows = rows.len(), "SQLite query executed");
    Ok(rows)
}

fn query_all(conn: &Connection, sql: &str) -> Result<Vec<Row>, StoreError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| StoreError::Query(e.to_string()))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();

    let mut rows = stmt
        .query([])
        .map_err(|e| StoreError::Query(e.to_string()))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| StoreError::Query(e.to_string()))? {
        let mut map = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            let value = row
                .get_ref(idx)
                .map_err(|e| StoreError::Query(e.to_string()))?;
            map.insert(name.clone(), sqlite_value_to_json(value));
        }
        out.push(map);
    }
    Ok(out)
}

fn sqlite_value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}
