//! Typed access to the persisted user settings.
//!
//! Every getter is total: missing, mistyped or out-of-range values read as the
//! default registered when the store was created. Nothing is validated on
//! write, and an invalid stored value is masked on read but never corrected in
//! storage.

use std::path::PathBuf;

use directories::BaseDirs;
use serde::Serialize;
use serde_json::Value;

use crate::backend::SettingsBackend;
use crate::error::{Result, StorageError};

/// Persisted settings keys.
pub mod keys {
    /// Start the engine when the user logs in.
    pub const AUTOSTART: &str = "Autostart";
    /// Engine listening port.
    pub const PORT: &str = "Port";
    /// PAC file path.
    pub const PAC_FILE: &str = "PacFile";
    /// Negotiate (SPNEGO) authentication.
    pub const NEGOTIATE: &str = "Negotiate";
    /// Always tunnel through CONNECT.
    pub const ALWAYS_USE_CONNECT: &str = "alwaysUseConnect";
    /// Fall back to a direct connection when the upstream proxy fails.
    pub const DIRECT_FALLBACK: &str = "DirectFallback";

    /// All known keys.
    pub const ALL: [&str; 6] = [
        AUTOSTART,
        PORT,
        PAC_FILE,
        NEGOTIATE,
        ALWAYS_USE_CONNECT,
        DIRECT_FALLBACK,
    ];
}

/// Default engine port of this deployment variant.
#[cfg(not(feature = "alt-default-port"))]
pub const DEFAULT_PORT: u16 = 3128;

/// Default engine port of this deployment variant.
#[cfg(feature = "alt-default-port")]
pub const DEFAULT_PORT: u16 = 8080;

/// Lowest port accepted from storage.
pub const MIN_PORT: u16 = 1024;

/// Exclusive upper bound for ports accepted from storage.
pub const MAX_PORT_EXCLUSIVE: u16 = 65535;

/// Returns whether `port` may be read back from storage.
pub fn is_valid_port(port: i64) -> bool {
    (i64::from(MIN_PORT)..i64::from(MAX_PORT_EXCLUSIVE)).contains(&port)
}

/// Returns `<app-support-dir>/Proxydetox/proxy.pac`.
pub fn default_pac_file() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.data_dir().join("Proxydetox").join("proxy.pac"))
        .unwrap_or_else(|| PathBuf::from("proxy.pac"))
}

/// Defaults registered with a [`ConfigurationStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDefaults {
    /// Port returned when none (or an invalid one) is stored.
    pub port: u16,
    /// PAC file returned when none is stored.
    pub pac_file: PathBuf,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            pac_file: default_pac_file(),
        }
    }
}

/// Snapshot of all user settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyConfiguration {
    /// Engine listening port, always within `[1024, 65535)` unless the
    /// registered default is not.
    pub port: u16,
    /// PAC file handed to the engine.
    pub pac_file: PathBuf,
    /// Negotiate (SPNEGO) authentication.
    pub negotiate: bool,
    /// Always tunnel through CONNECT.
    pub always_use_connect: bool,
    /// Fall back to a direct connection.
    pub direct_fallback: bool,
    /// Start on login.
    pub autostart: bool,
}

/// Typed settings accessors over a [`SettingsBackend`].
pub struct ConfigurationStore<B> {
    backend: B,
    defaults: ConfigDefaults,
}

impl<B: SettingsBackend> ConfigurationStore<B> {
    /// Creates a store with the standard defaults.
    pub fn new(backend: B) -> Self {
        Self::with_defaults(backend, ConfigDefaults::default())
    }

    /// Creates a store with explicit defaults.
    pub fn with_defaults(backend: B, defaults: ConfigDefaults) -> Self {
        Self { backend, defaults }
    }

    /// Returns the registered defaults.
    pub fn defaults(&self) -> &ConfigDefaults {
        &self.defaults
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn read(&self, key: &str) -> Option<Value> {
        match self.backend.get_value(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read setting {}: {}", key, e);
                None
            }
        }
    }

    fn read_bool(&self, key: &str) -> bool {
        self.read(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Engine port. Stored values outside `[1024, 65535)` read as the default.
    pub fn port(&self) -> u16 {
        self.read(keys::PORT)
            .and_then(|v| v.as_i64())
            .filter(|p| is_valid_port(*p))
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(self.defaults.port)
    }

    /// Stores the engine port as given.
    pub fn set_port(&self, port: u16) -> Result<()> {
        self.backend.set_value(keys::PORT, Value::from(port))
    }

    /// PAC file path.
    pub fn pac_file(&self) -> PathBuf {
        self.read(keys::PAC_FILE)
            .and_then(|v| v.as_str().map(PathBuf::from))
            .unwrap_or_else(|| self.defaults.pac_file.clone())
    }

    /// Stores the PAC file path.
    pub fn set_pac_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        self.backend
            .set_value(keys::PAC_FILE, Value::from(path.to_string_lossy().into_owned()))
    }

    /// Negotiate authentication toggle.
    pub fn negotiate(&self) -> bool {
        self.read_bool(keys::NEGOTIATE)
    }

    /// Stores the negotiate toggle.
    pub fn set_negotiate(&self, enabled: bool) -> Result<()> {
        self.backend.set_value(keys::NEGOTIATE, Value::from(enabled))
    }

    /// Always-use-connect toggle.
    pub fn always_use_connect(&self) -> bool {
        self.read_bool(keys::ALWAYS_USE_CONNECT)
    }

    /// Stores the always-use-connect toggle.
    pub fn set_always_use_connect(&self, enabled: bool) -> Result<()> {
        self.backend
            .set_value(keys::ALWAYS_USE_CONNECT, Value::from(enabled))
    }

    /// Direct-fallback toggle.
    pub fn direct_fallback(&self) -> bool {
        self.read_bool(keys::DIRECT_FALLBACK)
    }

    /// Stores the direct-fallback toggle.
    pub fn set_direct_fallback(&self, enabled: bool) -> Result<()> {
        self.backend.set_value(keys::DIRECT_FALLBACK, Value::from(enabled))
    }

    /// Autostart toggle.
    pub fn autostart(&self) -> bool {
        self.read_bool(keys::AUTOSTART)
    }

    /// Stores the autostart toggle.
    pub fn set_autostart(&self, enabled: bool) -> Result<()> {
        self.backend.set_value(keys::AUTOSTART, Value::from(enabled))
    }

    /// Reads every setting at once.
    pub fn snapshot(&self) -> ProxyConfiguration {
        ProxyConfiguration {
            port: self.port(),
            pac_file: self.pac_file(),
            negotiate: self.negotiate(),
            always_use_connect: self.always_use_connect(),
            direct_fallback: self.direct_fallback(),
            autostart: self.autostart(),
        }
    }

    /// Stores a setting given as text, as typed on a command line.
    ///
    /// The value is converted to the key's type but not range checked.
    pub fn set_from_str(&self, key: &str, raw: &str) -> Result<()> {
        let invalid = || StorageError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        };

        let value = match key {
            keys::PORT => Value::from(raw.trim().parse::<i64>().map_err(|_| invalid())?),
            keys::PAC_FILE => Value::from(raw),
            keys::AUTOSTART
            | keys::NEGOTIATE
            | keys::ALWAYS_USE_CONNECT
            | keys::DIRECT_FALLBACK => Value::from(parse_bool(raw).ok_or_else(invalid)?),
            _ => return Err(StorageError::UnknownKey(key.to_string())),
        };

        self.backend.set_value(key, value)
    }

    /// Removes a stored setting so that it reads as its default again.
    pub fn reset(&self, key: &str) -> Result<bool> {
        if !keys::ALL.contains(&key) {
            return Err(StorageError::UnknownKey(key.to_string()));
        }
        self.backend.remove_value(key)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
