//! Database schema and migrations.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version, kept in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Brings the settings database up to [`SCHEMA_VERSION`].
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current = schema_version(conn)?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    info!("Migrating settings database from v{} to v{}", current, SCHEMA_VERSION);
    if current < 1 {
        // Values are JSON encoded so every key keeps its native type.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;
    }
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_config_table_exists() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'config'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
