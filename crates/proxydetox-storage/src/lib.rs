//! Proxydetox Storage - persisted user settings.
//!
//! This crate owns the settings the control plane reads before launching the
//! proxy engine:
//!
//! - Engine port (masked to `[1024, 65535)` on read)
//! - PAC file location
//! - Negotiate, always-use-connect and direct-fallback toggles
//! - Autostart flag
//!
//! Settings are stored through a [`SettingsBackend`]. [`Database`] keeps them
//! in a small SQLite file in the platform data directory; [`MemoryBackend`]
//! keeps them in memory.
//!
//! # Example
//!
//! ```no_run
//! use proxydetox_storage::{ConfigurationStore, MemoryBackend};
//!
//! let store = ConfigurationStore::new(MemoryBackend::new());
//! store.set_port(3129).unwrap();
//! assert_eq!(store.snapshot().port, 3129);
//! ```

mod backend;
mod database;
pub mod error;
mod pool;
pub mod repository;
mod schema;
pub mod store;

pub use backend::{MemoryBackend, SettingsBackend};
pub use database::Database;
pub use error::{Result, StorageError};
pub use pool::ConnectionPool;
pub use store::{
    default_pac_file, is_valid_port, keys, ConfigDefaults, ConfigurationStore,
    ProxyConfiguration, DEFAULT_PORT,
};
