//! Proxydetox SysProxy - points the OS proxy settings at the local engine.
//!
//! A run acquires a one-shot privileged credential, opens the network
//! preferences under it, compares every Wi-Fi and Ethernet service's proxy
//! dictionary with the one derived from the target port, and commits the
//! services that differ as one batch.
//!
//! ## Architecture
//!
//! ```text
//! run(port) → authorization::acquire → open_session → services::enumerate
//!                                                           │
//!                                          per AirPort/Ethernet service
//!                                                           ▼
//!                                  differ::needs_write(current, differ::desired(port))
//!                                                           │
//!                                           PreferencesTransaction::stage
//!                                                           ▼
//!                                  commit → apply → synchronize (only if staged)
//! ```
//!
//! The OS is reached through the [`SystemPreferences`] capability trait.
//! [`MacPreferences`] binds it on macOS; [`MemoryPreferences`] is an
//! in-memory stand-in that records calls and can inject failures.

pub mod authorization;
mod backend;
pub mod differ;
mod error;
#[cfg(target_os = "macos")]
mod macos;
pub mod memory;
pub mod services;
mod sync;
mod transaction;
mod value;

pub use backend::{
    AuthorizationFlags, NoSession, PreferencesSession, SystemPreferences, UnsupportedPreferences,
};
pub use differ::{desired, needs_write};
pub use error::{OsStatus, PreferencesError, Result, ServiceWriteError, SyncError};
#[cfg(target_os = "macos")]
pub use macos::{MacAuthorization, MacPreferences, MacSession};
pub use memory::MemoryPreferences;
pub use services::{HardwareKind, NetworkServiceRecord};
pub use sync::{SyncPhase, SyncReport, SystemProxySynchronizer, SESSION_NAME};
pub use transaction::{PreferencesTransaction, ServiceOutcome};
pub use value::{PrefValue, ProxyDict};

/// The preferences backend of the current platform.
#[cfg(target_os = "macos")]
pub type PlatformPreferences = MacPreferences;

/// The preferences backend of the current platform.
#[cfg(not(target_os = "macos"))]
pub type PlatformPreferences = UnsupportedPreferences;

/// Creates a synchronizer bound to the current platform.
pub fn platform_synchronizer() -> SystemProxySynchronizer<PlatformPreferences> {
    SystemProxySynchronizer::new(PlatformPreferences::default())
}
