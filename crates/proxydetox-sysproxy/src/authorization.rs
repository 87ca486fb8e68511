//! One-shot privileged credential acquisition.

use tracing::{debug, error};

use crate::backend::{AuthorizationFlags, SystemPreferences};
use crate::error::{Result, SyncError};

/// Acquires a privileged credential for a single synchronization run.
///
/// The credential is released when the returned value is dropped; callers keep
/// it alive only for the duration of the run and never cache it.
pub fn acquire<P: SystemPreferences>(
    prefs: &P,
    flags: AuthorizationFlags,
) -> Result<P::Authorization> {
    debug!("Requesting authorization (flags={:#x})", flags.bits());

    prefs.acquire_authorization(flags).map_err(|status| {
        error!(
            "Authorization failed with status {}: {}",
            status.code, status.message
        );
        SyncError::from(status)
    })
}
