//! Error types for the engine supervisor.

use std::path::PathBuf;

use thiserror::Error;

/// Supervisor error type.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The engine could not be launched. No handle is kept.
    #[error("failed to launch {}: {source}", path.display())]
    Launch {
        /// Executable that was tried.
        path: PathBuf,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The termination signal could not be delivered.
    #[error("failed to signal engine process {pid}: {message}")]
    Signal {
        /// Process id.
        pid: u32,
        /// OS error description.
        message: String,
    },

    /// The exit watcher thread could not be started.
    #[error("failed to start exit watcher: {0}")]
    Watcher(#[source] std::io::Error),

    /// The engine executable location could not be determined.
    #[error("failed to determine engine executable path")]
    ExecutablePath,
}

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
