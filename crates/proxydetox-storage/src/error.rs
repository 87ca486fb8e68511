//! Storage error types.

use thiserror::Error;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from rusqlite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (e.g., creating directories).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown settings key.
    #[error("Unknown setting: {0}")]
    UnknownKey(String),

    /// Value could not be converted to the setting's type.
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        /// Settings key.
        key: String,
        /// Raw value as given.
        value: String,
    },
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
