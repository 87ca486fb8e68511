//! Capability seam over the OS authorization and network preferences APIs.

use crate::error::{OsStatus, PreferencesError};
use crate::value::{PrefValue, ProxyDict};

/// Authorization options, mirroring the OS flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthorizationFlags {
    /// Allow the user to be prompted.
    pub interaction_allowed: bool,
    /// Allow the rights to be extended.
    pub extend_rights: bool,
    /// Acquire the rights up front.
    pub pre_authorize: bool,
}

impl AuthorizationFlags {
    /// Flag set used for every synchronization run.
    pub const SYNC: Self = Self {
        interaction_allowed: true,
        extend_rights: true,
        pre_authorize: true,
    };

    /// Returns the native bit mask.
    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.interaction_allowed {
            bits |= 1 << 0;
        }
        if self.extend_rights {
            bits |= 1 << 1;
        }
        if self.pre_authorize {
            bits |= 1 << 4;
        }
        bits
    }
}

/// Entry point to the OS network preferences.
///
/// The authorization handle is released when dropped, so every value returned
/// by [`SystemPreferences::acquire_authorization`] is freed exactly once.
pub trait SystemPreferences {
    /// Privileged credential.
    type Authorization;
    /// Authorized preferences session.
    type Session: PreferencesSession;

    /// Requests a privileged credential. May block on a user prompt.
    fn acquire_authorization(
        &self,
        flags: AuthorizationFlags,
    ) -> std::result::Result<Self::Authorization, OsStatus>;

    /// Opens the network preferences under `authorization`.
    fn open_session(
        &self,
        name: &str,
        authorization: &Self::Authorization,
    ) -> std::result::Result<Self::Session, PreferencesError>;
}

/// An opened, authorized view of the network preferences.
pub trait PreferencesSession {
    /// Reads a top-level preferences value, e.g. `NetworkServices`.
    fn get_value(&self, key: &str) -> Option<PrefValue>;

    /// Stages `value` at a slash-separated preferences path.
    fn set_path_value(
        &mut self,
        path: &str,
        value: &ProxyDict,
    ) -> std::result::Result<(), PreferencesError>;

    /// Writes staged changes to disk.
    fn commit(&mut self) -> std::result::Result<(), PreferencesError>;

    /// Makes committed changes active system-wide.
    fn apply(&mut self) -> std::result::Result<(), PreferencesError>;

    /// Re-syncs the session's cached copy with disk.
    fn synchronize(&mut self);
}

/// Preferences for platforms without a supported network preferences store.
///
/// Authorization trivially succeeds; opening a session always fails, so a run
/// ends before anything is written.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPreferences;

/// Session type of [`UnsupportedPreferences`]; never constructed.
#[derive(Debug)]
pub enum NoSession {}

impl SystemPreferences for UnsupportedPreferences {
    type Authorization = ();
    type Session = NoSession;

    fn acquire_authorization(
        &self,
        _flags: AuthorizationFlags,
    ) -> std::result::Result<Self::Authorization, OsStatus> {
        Ok(())
    }

    fn open_session(
        &self,
        _name: &str,
        _authorization: &Self::Authorization,
    ) -> std::result::Result<Self::Session, PreferencesError> {
        Err(PreferencesError::new(
            "system network preferences are not supported on this platform",
        ))
    }
}

impl PreferencesSession for NoSession {
    fn get_value(&self, _key: &str) -> Option<PrefValue> {
        match *self {}
    }

    fn set_path_value(
        &mut self,
        _path: &str,
        _value: &ProxyDict,
    ) -> std::result::Result<(), PreferencesError> {
        match *self {}
    }

    fn commit(&mut self) -> std::result::Result<(), PreferencesError> {
        match *self {}
    }

    fn apply(&mut self) -> std::result::Result<(), PreferencesError> {
        match *self {}
    }

    fn synchronize(&mut self) {
        match *self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_flag_bits() {
        // kAuthorizationFlagInteractionAllowed | ExtendRights | PreAuthorize
        assert_eq!(AuthorizationFlags::SYNC.bits(), 0b1_0011);
        assert_eq!(AuthorizationFlags::default().bits(), 0);
    }

    #[test]
    fn test_unsupported_platform_refuses_session() {
        let prefs = UnsupportedPreferences;
        assert!(prefs.acquire_authorization(AuthorizationFlags::SYNC).is_ok());
        assert!(prefs.open_session("Proxydetox", &()).is_err());
    }
}
