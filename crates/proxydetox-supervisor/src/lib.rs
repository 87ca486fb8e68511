//! Proxydetox Supervisor - lifecycle of the proxy engine process.
//!
//! The engine is a separate executable. [`ProcessSupervisor`] launches it
//! with a command line built from the current [`ConfigurationStore`]
//! snapshot, terminates it on request and records how it exited.
//!
//! ```text
//! start() ──→ Running ──stop()──→ Stopped
//!    ▲           │
//!    └─restart()─┘   (engine exits on its own → not running, handle kept until stop)
//! ```
//!
//! [`ConfigurationStore`]: proxydetox_storage::ConfigurationStore

pub mod command;
pub mod error;
mod network;
mod supervisor;

pub use command::{default_engine_path, EngineCommand, ENGINE_BINARY, GRACEFUL_SHUTDOWN_TIMEOUT};
pub use error::{Result, SupervisorError};
pub use network::InternalNetwork;
pub use supervisor::{ExitRecord, ProcessSupervisor};
