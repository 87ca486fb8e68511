//! macOS binding: Security.framework authorization and SystemConfiguration
//! preferences.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;

use core_foundation::array::{CFArray, CFArrayGetTypeID, CFArrayRef};
use core_foundation::base::{
    Boolean, CFGetTypeID, CFType, CFTypeRef, OSStatus, TCFType,
};
use core_foundation::boolean::{CFBoolean, CFBooleanGetTypeID, CFBooleanRef};
use core_foundation::dictionary::{CFDictionary, CFDictionaryGetTypeID, CFDictionaryRef};
use core_foundation::number::{CFNumber, CFNumberGetTypeID, CFNumberIsFloatType, CFNumberRef};
use core_foundation::string::{CFString, CFStringGetTypeID, CFStringRef};

use crate::backend::{AuthorizationFlags, PreferencesSession, SystemPreferences};
use crate::error::{OsStatus, PreferencesError};
use crate::value::{PrefValue, ProxyDict};

#[repr(C)]
struct OpaqueAuthorization {
    _private: [u8; 0],
}
type AuthorizationRef = *const OpaqueAuthorization;

#[repr(C)]
struct OpaquePreferences {
    _private: [u8; 0],
}
type SCPreferencesRef = *const OpaquePreferences;

const ERR_AUTHORIZATION_SUCCESS: OSStatus = 0;
const AUTHORIZATION_FLAG_DEFAULTS: u32 = 0;

#[link(name = "Security", kind = "framework")]
extern "C" {
    fn AuthorizationCreate(
        rights: *const c_void,
        environment: *const c_void,
        flags: u32,
        authorization: *mut AuthorizationRef,
    ) -> OSStatus;
    fn AuthorizationFree(authorization: AuthorizationRef, flags: u32) -> OSStatus;
    fn SecCopyErrorMessageString(status: OSStatus, reserved: *mut c_void) -> CFStringRef;
}

#[link(name = "SystemConfiguration", kind = "framework")]
extern "C" {
    fn SCPreferencesCreateWithAuthorization(
        allocator: *const c_void,
        name: CFStringRef,
        prefs_id: CFStringRef,
        authorization: AuthorizationRef,
    ) -> SCPreferencesRef;
    fn SCPreferencesGetValue(prefs: SCPreferencesRef, key: CFStringRef) -> CFTypeRef;
    fn SCPreferencesPathSetValue(
        prefs: SCPreferencesRef,
        path: CFStringRef,
        value: CFDictionaryRef,
    ) -> Boolean;
    fn SCPreferencesCommitChanges(prefs: SCPreferencesRef) -> Boolean;
    fn SCPreferencesApplyChanges(prefs: SCPreferencesRef) -> Boolean;
    fn SCPreferencesSynchronize(prefs: SCPreferencesRef);
    fn SCError() -> c_int;
    fn SCErrorString(status: c_int) -> *const c_char;
}

/// The system network preferences.
#[derive(Debug, Default, Clone, Copy)]
pub struct MacPreferences;

/// Authorization reference, freed on drop.
#[derive(Debug)]
pub struct MacAuthorization {
    raw: AuthorizationRef,
}

impl Drop for MacAuthorization {
    fn drop(&mut self) {
        // SAFETY: `raw` came from a successful AuthorizationCreate and is freed only here.
        unsafe {
            AuthorizationFree(self.raw, AUTHORIZATION_FLAG_DEFAULTS);
        }
    }
}

/// SCPreferences session, released on drop.
pub struct MacSession {
    // Owns the +1 reference returned by SCPreferencesCreateWithAuthorization.
    prefs: CFType,
}

impl MacSession {
    fn raw(&self) -> SCPreferencesRef {
        self.prefs.as_CFTypeRef() as SCPreferencesRef
    }
}

fn status_message(status: OSStatus) -> String {
    // SAFETY: the returned string follows the create rule.
    unsafe {
        let message = SecCopyErrorMessageString(status, ptr::null_mut());
        if message.is_null() {
            "unknown error".to_string()
        } else {
            CFString::wrap_under_create_rule(message).to_string()
        }
    }
}

fn last_sc_error() -> PreferencesError {
    // SAFETY: SCErrorString returns a static C string for any status.
    unsafe {
        let status = SCError();
        let message = SCErrorString(status);
        if message.is_null() {
            PreferencesError::new(format!("SystemConfiguration error {}", status))
        } else {
            PreferencesError::new(CStr::from_ptr(message).to_string_lossy().into_owned())
        }
    }
}

impl SystemPreferences for MacPreferences {
    type Authorization = MacAuthorization;
    type Session = MacSession;

    fn acquire_authorization(
        &self,
        flags: AuthorizationFlags,
    ) -> std::result::Result<Self::Authorization, OsStatus> {
        let mut raw: AuthorizationRef = ptr::null();
        // SAFETY: null rights and environment are allowed; `raw` is a valid out pointer.
        let status =
            unsafe { AuthorizationCreate(ptr::null(), ptr::null(), flags.bits(), &mut raw) };

        if status != ERR_AUTHORIZATION_SUCCESS || raw.is_null() {
            return Err(OsStatus {
                code: status,
                message: status_message(status),
            });
        }
        Ok(MacAuthorization { raw })
    }

    fn open_session(
        &self,
        name: &str,
        authorization: &Self::Authorization,
    ) -> std::result::Result<Self::Session, PreferencesError> {
        let name = CFString::new(name);
        // SAFETY: all arguments are valid for the duration of the call.
        let raw = unsafe {
            SCPreferencesCreateWithAuthorization(
                ptr::null(),
                name.as_concrete_TypeRef(),
                ptr::null(),
                authorization.raw,
            )
        };
        if raw.is_null() {
            return Err(PreferencesError::new(
                "unable to create SCPreferencesCreateWithAuthorization",
            ));
        }

        // SAFETY: `raw` is a non-null CF object returned under the create rule.
        let prefs = unsafe { CFType::wrap_under_create_rule(raw as CFTypeRef) };
        Ok(MacSession { prefs })
    }
}

impl PreferencesSession for MacSession {
    fn get_value(&self, key: &str) -> Option<PrefValue> {
        let key = CFString::new(key);
        // SAFETY: the returned value follows the get rule and stays valid while
        // the session is alive; it is converted before returning.
        unsafe {
            let value = SCPreferencesGetValue(self.raw(), key.as_concrete_TypeRef());
            from_cf(value)
        }
    }

    fn set_path_value(
        &mut self,
        path: &str,
        value: &ProxyDict,
    ) -> std::result::Result<(), PreferencesError> {
        let path = CFString::new(path);
        let dict = dict_to_cf(value);
        // SAFETY: path and dict are valid CF objects for the duration of the call.
        let ok = unsafe {
            SCPreferencesPathSetValue(
                self.raw(),
                path.as_concrete_TypeRef(),
                dict.as_concrete_TypeRef(),
            )
        };
        if ok == 0 {
            return Err(last_sc_error());
        }
        Ok(())
    }

    fn commit(&mut self) -> std::result::Result<(), PreferencesError> {
        // SAFETY: the session reference is valid.
        if unsafe { SCPreferencesCommitChanges(self.raw()) } == 0 {
            return Err(last_sc_error());
        }
        Ok(())
    }

    fn apply(&mut self) -> std::result::Result<(), PreferencesError> {
        // SAFETY: the session reference is valid.
        if unsafe { SCPreferencesApplyChanges(self.raw()) } == 0 {
            return Err(last_sc_error());
        }
        Ok(())
    }

    fn synchronize(&mut self) {
        // SAFETY: the session reference is valid.
        unsafe { SCPreferencesSynchronize(self.raw()) }
    }
}

/// Converts a borrowed CF property list into a [`PrefValue`].
///
/// Types without a [`PrefValue`] counterpart (data, dates) become
/// [`PrefValue::Opaque`]; non-string dictionary keys use their description.
unsafe fn from_cf(value: CFTypeRef) -> Option<PrefValue> {
    if value.is_null() {
        return None;
    }

    let type_id = CFGetTypeID(value);
    if type_id == CFStringGetTypeID() {
        let s = CFString::wrap_under_get_rule(value as CFStringRef);
        Some(PrefValue::String(s.to_string()))
    } else if type_id == CFBooleanGetTypeID() {
        let b = CFBoolean::wrap_under_get_rule(value as CFBooleanRef);
        Some(PrefValue::Bool(bool::from(b)))
    } else if type_id == CFNumberGetTypeID() {
        let n = CFNumber::wrap_under_get_rule(value as CFNumberRef);
        if CFNumberIsFloatType(value as CFNumberRef) != 0 {
            n.to_f64().map(PrefValue::Real)
        } else {
            n.to_i64().map(PrefValue::Integer)
        }
    } else if type_id == CFArrayGetTypeID() {
        let array = CFArray::<*const c_void>::wrap_under_get_rule(value as CFArrayRef);
        let items = array
            .get_all_values()
            .into_iter()
            .filter_map(|item| from_cf(item as CFTypeRef))
            .collect();
        Some(PrefValue::Array(items))
    } else if type_id == CFDictionaryGetTypeID() {
        let dict = CFDictionary::<*const c_void, *const c_void>::wrap_under_get_rule(
            value as CFDictionaryRef,
        );
        let (keys, values) = dict.get_keys_and_values();
        let mut map = ProxyDict::new();
        for (key, value) in keys.into_iter().zip(values) {
            let key = match from_cf(key as CFTypeRef) {
                Some(PrefValue::String(key)) => key,
                _ => describe(key as CFTypeRef),
            };
            if let Some(value) = from_cf(value as CFTypeRef) {
                map.insert(key, value);
            }
        }
        Some(PrefValue::Dictionary(map))
    } else {
        Some(PrefValue::Opaque(describe(value)))
    }
}

/// `CFCopyDescription` of a borrowed, non-null CF object.
unsafe fn describe(value: CFTypeRef) -> String {
    if value.is_null() {
        return "<null>".to_string();
    }
    format!("{:?}", CFType::wrap_under_get_rule(value))
}

fn to_cf(value: &PrefValue) -> CFType {
    match value {
        PrefValue::Bool(b) => {
            if *b {
                CFBoolean::true_value().as_CFType()
            } else {
                CFBoolean::false_value().as_CFType()
            }
        }
        PrefValue::Integer(i) => CFNumber::from(*i).as_CFType(),
        PrefValue::Real(r) => CFNumber::from(*r).as_CFType(),
        PrefValue::String(s) => CFString::new(s).as_CFType(),
        PrefValue::Array(items) => {
            let items: Vec<CFType> = items.iter().map(to_cf).collect();
            CFArray::from_CFTypes(&items).as_CFType()
        }
        PrefValue::Dictionary(map) => dict_to_cf(map).as_CFType(),
        // Only read back from the OS; written dictionaries never carry one.
        PrefValue::Opaque(description) => CFString::new(description).as_CFType(),
    }
}

fn dict_to_cf(map: &ProxyDict) -> CFDictionary<CFString, CFType> {
    let pairs: Vec<(CFString, CFType)> = map
        .iter()
        .map(|(key, value)| (CFString::new(key), to_cf(value)))
        .collect();
    CFDictionary::from_CFType_pairs(&pairs)
}
