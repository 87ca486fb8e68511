//! High-level database interface.

use std::path::PathBuf;

use directories::ProjectDirs;
use tracing::info;

use crate::backend::SettingsBackend;
use crate::error::{Result, StorageError};
use crate::pool::ConnectionPool;
use crate::repository::ConfigRepo;

/// SQLite-backed settings database.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Open the database in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_db_path()?)
    }

    /// Open the database at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening settings database at: {:?}", path);
        let pool = ConnectionPool::new(&path)?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self { pool })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("cc", "colorto", "Proxydetox")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join("settings.db"))
    }

    /// Get a raw settings value.
    pub fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.pool.get();
        ConfigRepo::get(&conn, key)
    }

    /// Set a raw settings value.
    pub fn set_config(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.pool.get();
        ConfigRepo::set(&conn, key, value)
    }

    /// Delete a settings value.
    pub fn delete_config(&self, key: &str) -> Result<bool> {
        let conn = self.pool.get();
        ConfigRepo::delete(&conn, key)
    }

    /// Get all stored settings values.
    pub fn get_all_config(&self) -> Result<Vec<(String, serde_json::Value)>> {
        let conn = self.pool.get();
        ConfigRepo::get_all(&conn)
    }
}

impl SettingsBackend for Database {
    fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.get_config(key)
    }

    fn set_value(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.set_config(key, &value)
    }

    fn remove_value(&self, key: &str) -> Result<bool> {
        self.delete_config(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_memory_roundtrip() {
        let db = Database::in_memory().unwrap();
        db.set_value("Port", json!(4000)).unwrap();
        assert_eq!(db.get_value("Port").unwrap(), Some(json!(4000)));
    }

    #[test]
    fn test_file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.db");

        {
            let db = Database::with_path(&path).unwrap();
            db.set_config("Negotiate", &json!(true)).unwrap();
        }

        let db = Database::with_path(&path).unwrap();
        assert_eq!(db.get_config("Negotiate").unwrap(), Some(json!(true)));
        assert_eq!(db.get_all_config().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_value() {
        let db = Database::in_memory().unwrap();
        db.set_value("PacFile", json!("/tmp/a.pac")).unwrap();
        assert!(db.remove_value("PacFile").unwrap());
        assert_eq!(db.get_value("PacFile").unwrap(), None);
    }
}
