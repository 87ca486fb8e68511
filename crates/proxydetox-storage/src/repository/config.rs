//! Settings repository.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Repository for settings rows.
pub struct ConfigRepo;

impl ConfigRepo {
    /// Get a setting value.
    ///
    /// A stored value that is not valid JSON reads as `Null` so that the typed
    /// accessors fall back to their defaults.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>> {
        let value: Option<String> = conn
            .query_row("SELECT value FROM config WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(value.map(|s| serde_json::from_str(&s).unwrap_or(serde_json::Value::Null)))
    }

    /// Set a setting value (insert or update).
    pub fn set(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
        let value_json = serde_json::to_string(value)?;

        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value_json],
        )?;

        Ok(())
    }

    /// Delete a setting. Returns whether a row was removed.
    pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM config WHERE key = ?1", [key])?;
        Ok(deleted > 0)
    }

    /// Get all stored settings ordered by key.
    pub fn get_all(conn: &Connection) -> Result<Vec<(String, serde_json::Value)>> {
        let mut stmt = conn.prepare("SELECT key, value FROM config ORDER BY key")?;

        let rows = stmt
            .query_map([], |row| {
                let key: String = row.get(0)?;
                let value_str: String = row.get(1)?;
                Ok((
                    key,
                    serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null),
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use serde_json::json;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_set_and_get() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "Port", &json!(3129)).unwrap();
        let value = ConfigRepo::get(&conn, "Port").unwrap();

        assert_eq!(value, Some(json!(3129)));
    }

    #[test]
    fn test_update_existing() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "Negotiate", &json!(false)).unwrap();
        ConfigRepo::set(&conn, "Negotiate", &json!(true)).unwrap();

        assert_eq!(ConfigRepo::get(&conn, "Negotiate").unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_get_nonexistent() {
        let conn = setup_db();
        assert!(ConfigRepo::get(&conn, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_value_reads_as_null() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO config (key, value) VALUES ('Port', 'not json')",
            [],
        )
        .unwrap();

        assert_eq!(
            ConfigRepo::get(&conn, "Port").unwrap(),
            Some(serde_json::Value::Null)
        );
    }

    #[test]
    fn test_delete() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "PacFile", &json!("/tmp/proxy.pac")).unwrap();
        assert!(ConfigRepo::delete(&conn, "PacFile").unwrap());
        assert!(!ConfigRepo::delete(&conn, "PacFile").unwrap());
        assert!(ConfigRepo::get(&conn, "PacFile").unwrap().is_none());
    }

    #[test]
    fn test_get_all_is_sorted() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "Port", &json!(1)).unwrap();
        ConfigRepo::set(&conn, "Autostart", &json!(true)).unwrap();

        let all = ConfigRepo::get_all(&conn).unwrap();
        let keys: Vec<_> = all.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Autostart", "Port"]);
    }
}
