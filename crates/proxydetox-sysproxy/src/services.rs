//! Network service enumeration.

use std::fmt;

use serde::Serialize;

use crate::backend::PreferencesSession;
use crate::value::{PrefValue, ProxyDict};

/// Top-level preferences key holding all network services.
pub const NETWORK_SERVICES: &str = "NetworkServices";
/// Per-service key holding the interface description.
pub const INTERFACE: &str = "Interface";
/// Interface key naming the hardware kind.
pub const HARDWARE: &str = "Hardware";
/// Per-service key holding the proxy dictionary.
pub const PROXIES: &str = "Proxies";

/// Hardware kind of a network service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HardwareKind {
    /// Wi-Fi.
    AirPort,
    /// Wired Ethernet, including USB and Thunderbolt adapters.
    Ethernet,
    /// Anything else (VPN, Bluetooth PAN, bridges, ...), with the raw name if known.
    Other(Option<String>),
}

impl HardwareKind {
    /// Parses the `Interface.Hardware` value.
    pub fn from_hardware(hardware: Option<&str>) -> Self {
        match hardware {
            Some("AirPort") => Self::AirPort,
            Some("Ethernet") => Self::Ethernet,
            other => Self::Other(other.map(str::to_string)),
        }
    }

    /// Only Wi-Fi and Ethernet services get their proxies rewritten.
    pub fn is_write_eligible(&self) -> bool {
        matches!(self, Self::AirPort | Self::Ethernet)
    }
}

impl fmt::Display for HardwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AirPort => write!(f, "AirPort"),
            Self::Ethernet => write!(f, "Ethernet"),
            Self::Other(Some(name)) => write!(f, "{}", name),
            Self::Other(None) => write!(f, "unknown"),
        }
    }
}

/// Read-only snapshot of one configured network service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkServiceRecord {
    /// Service identifier (a UUID on macOS).
    pub service_id: String,
    /// Hardware kind.
    pub hardware: HardwareKind,
    /// Current proxy dictionary, if the service has one.
    pub current_proxies: Option<ProxyDict>,
}

impl NetworkServiceRecord {
    /// Preferences path of this service's proxy dictionary.
    pub fn proxies_path(&self) -> String {
        format!("/{}/{}/{}", NETWORK_SERVICES, self.service_id, PROXIES)
    }
}

/// Reads every configured network service from an open session.
///
/// Services of every hardware kind are returned; eligibility is decided by the
/// caller. Order follows the snapshot's key order. A missing or malformed
/// `NetworkServices` entry yields no services.
pub fn enumerate<S: PreferencesSession + ?Sized>(session: &S) -> Vec<NetworkServiceRecord> {
    let Some(PrefValue::Dictionary(services)) = session.get_value(NETWORK_SERVICES) else {
        tracing::warn!("No {} found in system preferences", NETWORK_SERVICES);
        return Vec::new();
    };

    services
        .into_iter()
        .map(|(service_id, service)| {
            let hardware = service
                .as_dict()
                .and_then(|d| d.get(INTERFACE))
                .and_then(PrefValue::as_dict)
                .and_then(|d| d.get(HARDWARE))
                .and_then(PrefValue::as_str);
            let hardware = HardwareKind::from_hardware(hardware);

            let current_proxies = service
                .as_dict()
                .and_then(|d| d.get(PROXIES))
                .and_then(PrefValue::as_dict)
                .cloned();

            NetworkServiceRecord {
                service_id,
                hardware,
                current_proxies,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AuthorizationFlags, SystemPreferences};
    use crate::differ;
    use crate::memory::MemoryPreferences;

    #[test]
    fn test_hardware_kind() {
        assert_eq!(HardwareKind::from_hardware(Some("AirPort")), HardwareKind::AirPort);
        assert_eq!(HardwareKind::from_hardware(Some("Ethernet")), HardwareKind::Ethernet);
        assert!(!HardwareKind::from_hardware(Some("PPP")).is_write_eligible());
        assert!(!HardwareKind::from_hardware(None).is_write_eligible());
        assert!(HardwareKind::AirPort.is_write_eligible());
        assert_eq!(HardwareKind::Other(Some("PPP".into())).to_string(), "PPP");
    }

    #[test]
    fn test_enumerate_returns_all_kinds() {
        let prefs = MemoryPreferences::new();
        prefs.add_service("A", Some("Ethernet"), Some(differ::desired(0)));
        prefs.add_service("B", Some("AirPort"), None);
        prefs.add_service("C", Some("IPSec"), Some(differ::desired(8080)));
        prefs.add_service("D", None, None);

        let auth = prefs.acquire_authorization(AuthorizationFlags::SYNC).unwrap();
        let session = prefs.open_session("test", &auth).unwrap();
        let services = enumerate(&session);

        assert_eq!(services.len(), 4);
        assert_eq!(services[0].service_id, "A");
        assert_eq!(services[0].hardware, HardwareKind::Ethernet);
        assert_eq!(services[0].current_proxies, Some(differ::desired(0)));
        assert_eq!(services[1].current_proxies, None);
        assert_eq!(services[2].hardware, HardwareKind::Other(Some("IPSec".into())));
        assert_eq!(services[3].hardware, HardwareKind::Other(None));
        assert_eq!(services[0].proxies_path(), "/NetworkServices/A/Proxies");
    }

    #[test]
    fn test_enumerate_is_side_effect_free() {
        let prefs = MemoryPreferences::new();
        prefs.add_service("A", Some("Ethernet"), None);

        let auth = prefs.acquire_authorization(AuthorizationFlags::SYNC).unwrap();
        let session = prefs.open_session("test", &auth).unwrap();
        let _ = enumerate(&session);

        assert!(prefs.writes().is_empty());
        assert_eq!(prefs.commits(), 0);
    }

    #[test]
    fn test_enumerate_without_services() {
        let prefs = MemoryPreferences::new();
        let auth = prefs.acquire_authorization(AuthorizationFlags::SYNC).unwrap();
        let session = prefs.open_session("test", &auth).unwrap();

        assert!(enumerate(&session).is_empty());
    }
}
