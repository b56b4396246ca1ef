//! Database schema migrations for the checkpoint store.

use rusqlite::Connection;
use tracing::info;

use safelens_core::SafelensError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), SafelensError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| SafelensError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| SafelensError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: checkpoints");
    }

    Ok(())
}

/// Version 1: workflow checkpoints keyed by thread.
fn apply_v1(conn: &Connection) -> Result<(), SafelensError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS checkpoints (
            thread_id   TEXT NOT NULL,
            sequence    INTEGER NOT NULL,
            node        TEXT,
            state_json  TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (thread_id, sequence)
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'checkpoints');
        ",
    )
    .map_err(|e| SafelensError::Storage(format!("Failed to apply migration v1: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
