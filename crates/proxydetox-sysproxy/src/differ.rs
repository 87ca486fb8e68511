//! Desired proxy settings and change detection.
//!
//! The desired dictionary is a pure function of the target port. A service is
//! rewritten whenever its current dictionary differs from it in any way; there
//! is no key-level patching.

use crate::value::{PrefValue, ProxyDict};

/// Host every enabled service is pointed at.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Hosts that always bypass the proxy.
pub const EXCEPTIONS: [&str; 4] = ["::1", "127.0.0.1", "localhost", "*.local"];

/// Keys of the per-service `Proxies` dictionary.
pub mod keys {
    /// HTTP proxy enable flag.
    pub const HTTP_ENABLE: &str = "HTTPEnable";
    /// HTTP proxy host.
    pub const HTTP_PROXY: &str = "HTTPProxy";
    /// HTTP proxy port.
    pub const HTTP_PORT: &str = "HTTPPort";
    /// HTTPS proxy enable flag.
    pub const HTTPS_ENABLE: &str = "HTTPSEnable";
    /// HTTPS proxy host.
    pub const HTTPS_PROXY: &str = "HTTPSProxy";
    /// HTTPS proxy port.
    pub const HTTPS_PORT: &str = "HTTPSPort";
    /// Web proxy auto-discovery (WPAD).
    pub const AUTO_DISCOVERY_ENABLE: &str = "ProxyAutoDiscoveryEnable";
    /// Automatic proxy configuration (PAC URL).
    pub const AUTO_CONFIG_ENABLE: &str = "ProxyAutoConfigEnable";
    /// SOCKS proxy enable flag.
    pub const SOCKS_ENABLE: &str = "SOCKSEnable";
    /// Gopher proxy enable flag.
    pub const GOPHER_ENABLE: &str = "GopherEnable";
    /// Bypass list.
    pub const EXCEPTIONS_LIST: &str = "ExceptionsList";
}

/// Computes the proxy dictionary every eligible service should carry.
///
/// Port `0` yields a disabled dictionary without host or port keys. Any other
/// port enables HTTP and HTTPS on `127.0.0.1:<port>`.
pub fn desired(port: u16) -> ProxyDict {
    let enable = i64::from(port != 0);
    let mut dict = ProxyDict::new();

    dict.insert(keys::HTTP_ENABLE.into(), PrefValue::Integer(enable));
    dict.insert(keys::HTTPS_ENABLE.into(), PrefValue::Integer(enable));
    if port != 0 {
        dict.insert(keys::HTTP_PROXY.into(), LOOPBACK_HOST.into());
        dict.insert(keys::HTTP_PORT.into(), port.into());
        dict.insert(keys::HTTPS_PROXY.into(), LOOPBACK_HOST.into());
        dict.insert(keys::HTTPS_PORT.into(), port.into());
    }

    dict.insert(keys::AUTO_DISCOVERY_ENABLE.into(), false.into());
    dict.insert(keys::AUTO_CONFIG_ENABLE.into(), false.into());
    dict.insert(keys::SOCKS_ENABLE.into(), false.into());
    dict.insert(keys::GOPHER_ENABLE.into(), false.into());
    dict.insert(keys::EXCEPTIONS_LIST.into(), EXCEPTIONS.to_vec().into());

    dict
}

/// Returns whether `current` must be overwritten with `desired`.
///
/// A service without any proxy dictionary always needs a write.
pub fn needs_write(current: Option<&ProxyDict>, desired: &ProxyDict) -> bool {
    current != Some(desired)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> PrefValue {
        PrefValue::Integer(v)
    }

    #[test]
    fn test_disabled_dictionary() {
        let dict = desired(0);

        assert_eq!(dict[keys::HTTP_ENABLE], int(0));
        assert_eq!(dict[keys::HTTPS_ENABLE], int(0));
        for key in [
            keys::HTTP_PROXY,
            keys::HTTP_PORT,
            keys::HTTPS_PROXY,
            keys::HTTPS_PORT,
        ] {
            assert!(!dict.contains_key(key), "{key} must be absent");
        }
        assert_eq!(dict.len(), 7);
    }

    #[test]
    fn test_enabled_dictionary_for_any_port() {
        for port in [1u16, 80, 3128, 8080, 65535] {
            let dict = desired(port);

            assert_eq!(dict[keys::HTTP_ENABLE], int(1));
            assert_eq!(dict[keys::HTTPS_ENABLE], int(1));
            assert_eq!(dict[keys::HTTP_PROXY], PrefValue::from("127.0.0.1"));
            assert_eq!(dict[keys::HTTPS_PROXY], PrefValue::from("127.0.0.1"));
            assert_eq!(dict[keys::HTTP_PORT], int(i64::from(port)));
            assert_eq!(dict[keys::HTTPS_PORT], int(i64::from(port)));
            assert_eq!(dict.len(), 11);
        }
    }

    #[test]
    fn test_auxiliary_protocols_always_disabled() {
        for port in [0u16, 3128] {
            let dict = desired(port);
            for key in [
                keys::AUTO_DISCOVERY_ENABLE,
                keys::AUTO_CONFIG_ENABLE,
                keys::SOCKS_ENABLE,
                keys::GOPHER_ENABLE,
            ] {
                assert_eq!(dict[key], PrefValue::Bool(false), "{key} for port {port}");
            }
            assert_eq!(
                dict[keys::EXCEPTIONS_LIST],
                PrefValue::from(vec!["::1", "127.0.0.1", "localhost", "*.local"])
            );
        }
    }

    #[test]
    fn test_desired_is_deterministic() {
        assert_eq!(desired(3128), desired(3128));
        assert_ne!(desired(3128), desired(3129));
        assert_ne!(desired(0), desired(3128));
    }

    #[test]
    fn test_needs_write_is_reflexive() {
        for port in [0u16, 3128] {
            let d = desired(port);
            assert!(!needs_write(Some(&d), &d));
        }
    }

    #[test]
    fn test_needs_write_is_reflexive_with_real_values() {
        let mut d = desired(3128);
        d.insert("Weight".into(), PrefValue::Real(f64::NAN));
        d.insert("Ratio".into(), PrefValue::Real(0.5));

        assert!(!needs_write(Some(&d), &d));
        assert!(!needs_write(Some(&d.clone()), &d));
    }

    #[test]
    fn test_unreadable_extra_key_triggers_write() {
        let d = desired(3128);
        let mut current = d.clone();
        current.insert("Blob".into(), PrefValue::Opaque("<CFData 0x1 [4]>".into()));

        assert!(needs_write(Some(&current), &d));
        assert!(!needs_write(Some(&current), &current));
    }

    #[test]
    fn test_needs_write_on_single_key_difference() {
        let d = desired(3128);

        let mut changed = d.clone();
        changed.insert(keys::HTTP_PORT.into(), int(3129));
        assert!(needs_write(Some(&changed), &d));

        let mut missing = d.clone();
        missing.remove(keys::SOCKS_ENABLE);
        assert!(needs_write(Some(&missing), &d));

        let mut extra = d.clone();
        extra.insert("FTPEnable".into(), int(0));
        assert!(needs_write(Some(&extra), &d));

        assert!(needs_write(None, &d));
    }

    #[test]
    fn test_numeric_flags_from_os_do_not_trigger_write() {
        let mut current = desired(0);
        current.insert(keys::SOCKS_ENABLE.into(), int(0));
        current.insert(keys::GOPHER_ENABLE.into(), int(0));

        assert!(!needs_write(Some(&current), &desired(0)));
    }
}
