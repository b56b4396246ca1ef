//! SQLite handle backing the checkpoint store.
//!
//! Writes go through one connection guarded by a mutex, which keeps per-thread
//! sequence allocation race-free. Reads of a file database open their own
//! read-only connection and see the last committed WAL snapshot, so they never
//! wait on that mutex. An in-memory database has a single connection and
//! serializes reads with writes.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction};
use tracing::info;

use safelens_core::SafelensError;

use crate::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn storage_err(context: &str, err: impl std::fmt::Display) -> SafelensError {
    SafelensError::Storage(format!("{}: {}", context, err))
}

/// Checkpoint database, on disk or in memory.
pub struct Database {
    conn: Mutex<Connection>,
    location: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database file at `path`, creating parent
    /// directories and applying pending migrations.
    pub fn new(path: &Path) -> Result<Self, SafelensError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| storage_err("Failed to open database", e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| storage_err("Failed to set busy timeout", e))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| storage_err("Failed to configure database", e))?;

        let db = Self::prepare(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "Checkpoint database ready");
        Ok(db)
    }

    /// Private in-memory database; contents vanish on drop.
    pub fn in_memory() -> Result<Self, SafelensError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| storage_err("Failed to open in-memory database", e))?;
        Self::prepare(conn, None)
    }

    fn prepare(conn: Connection, location: Option<PathBuf>) -> Result<Self, SafelensError> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    /// File backing this database, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SafelensError> {
        self.conn
            .lock()
            .map_err(|e| storage_err("Database lock poisoned", e))
    }

    /// Run `f` against the connection while holding the lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, SafelensError>
    where
        F: FnOnce(&Connection) -> Result<T, SafelensError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run a read-only `f` without holding the write lock.
    ///
    /// File databases get a fresh read-only connection per call; in-memory
    /// databases fall back to the shared connection.
    pub fn with_reader<F, T>(&self, f: F) -> Result<T, SafelensError>
    where
        F: FnOnce(&Connection) -> Result<T, SafelensError>,
    {
        let Some(path) = &self.location else {
            return self.with_conn(f);
        };
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| storage_err("Failed to open read connection", e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| storage_err("Failed to set busy timeout", e))?;
        f(&conn)
    }

    /// Run `f` inside a transaction. Commits on `Ok`, rolls back otherwise.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, SafelensError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, SafelensError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| storage_err("Failed to begin transaction", e))?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| storage_err("Failed to commit transaction", e))?;
        Ok(value)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(path) => write!(f, "Database({})", path.display()),
            None => f.write_str("Database(:memory:)"),
        }
    }
}
