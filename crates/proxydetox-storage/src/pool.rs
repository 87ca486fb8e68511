//! Shared SQLite connection.
//!
//! Settings are read and written a handful of times per user action, so a
//! single mutex-guarded connection serves every caller.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

use crate::error::Result;
use crate::schema::run_migrations;

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Cloneable handle to the settings connection.
#[derive(Clone)]
pub struct ConnectionPool {
    conn: Arc<Mutex<Connection>>,
}

impl ConnectionPool {
    /// Opens (creating if needed) the database file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        // The GUI and the controller CLI may have the file open at once.
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Self::prepare(conn)
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Locks the connection for the caller.
    pub fn get(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}
