//! Error types for system proxy synchronization.

use thiserror::Error;

/// Failure reported by a preferences backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PreferencesError {
    /// Human-readable description, as reported by the OS.
    pub message: String,
}

impl PreferencesError {
    /// Creates an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Non-success status returned when acquiring an authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsStatus {
    /// Raw status code.
    pub code: i32,
    /// Human-readable message for the code.
    pub message: String,
}

/// Errors that end a synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid port argument.
    #[error("{0}")]
    Argument(String),

    /// Privileged credential could not be acquired.
    #[error("{message}")]
    Authorization {
        /// OS status code.
        status: i32,
        /// Message for the status code.
        message: String,
    },

    /// Authorized preferences session could not be opened. Nothing was written.
    #[error("unable to open system network preferences: {0}")]
    Session(#[source] PreferencesError),

    /// Staged changes could not be committed. Earlier writes are not rolled back.
    #[error("failed to commit System Configuration Preferences: {0}")]
    Commit(#[source] PreferencesError),

    /// Committed changes could not be applied.
    #[error("failed to apply System Configuration Preferences: {0}")]
    Apply(#[source] PreferencesError),
}

impl From<OsStatus> for SyncError {
    fn from(status: OsStatus) -> Self {
        Self::Authorization {
            status: status.code,
            message: status.message,
        }
    }
}

/// A write that could not be staged for one network service.
///
/// These are collected per service and never abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to set System Configuration Preferences for {service_id}: {source}")]
pub struct ServiceWriteError {
    /// Service whose write failed.
    pub service_id: String,
    /// Backend failure.
    #[source]
    pub source: PreferencesError,
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
