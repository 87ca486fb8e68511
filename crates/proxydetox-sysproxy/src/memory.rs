//! In-memory network preferences.
//!
//! Records every call and committed write, and can be told to fail individual
//! steps. Clones share the same state, so a test can keep one handle for
//! inspection while the synchronizer owns another.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{AuthorizationFlags, PreferencesSession, SystemPreferences};
use crate::error::{OsStatus, PreferencesError};
use crate::services::{HARDWARE, INTERFACE, NETWORK_SERVICES, PROXIES};
use crate::value::{PrefValue, ProxyDict};

#[derive(Debug, Default)]
struct State {
    services: BTreeMap<String, PrefValue>,
    writes: Vec<(String, ProxyDict)>,
    calls: Vec<&'static str>,
    acquired: usize,
    released: usize,
    last_flags: Option<AuthorizationFlags>,
    commits: usize,
    applies: usize,
    synchronizes: usize,
    fail_authorization: Option<OsStatus>,
    fail_session: Option<String>,
    fail_set: HashSet<String>,
    fail_commit: bool,
    fail_apply: bool,
}

/// In-memory [`SystemPreferences`].
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    state: Arc<Mutex<State>>,
}

impl MemoryPreferences {
    /// Creates preferences without any network service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a network service. `hardware` is the `Interface.Hardware` value.
    pub fn add_service(&self, service_id: &str, hardware: Option<&str>, proxies: Option<ProxyDict>) {
        let mut service = BTreeMap::new();
        if let Some(hardware) = hardware {
            let mut interface = BTreeMap::new();
            interface.insert(HARDWARE.to_string(), PrefValue::from(hardware));
            service.insert(INTERFACE.to_string(), PrefValue::Dictionary(interface));
        }
        if let Some(proxies) = proxies {
            service.insert(PROXIES.to_string(), PrefValue::Dictionary(proxies));
        }

        self.state
            .lock()
            .services
            .insert(service_id.to_string(), PrefValue::Dictionary(service));
    }

    /// Returns the stored proxy dictionary of a service.
    pub fn service_proxies(&self, service_id: &str) -> Option<ProxyDict> {
        self.state
            .lock()
            .services
            .get(service_id)
            .and_then(PrefValue::as_dict)
            .and_then(|d| d.get(PROXIES))
            .and_then(PrefValue::as_dict)
            .cloned()
    }

    /// Makes the next authorizations fail with `code`.
    pub fn fail_authorization(&self, code: i32, message: &str) {
        self.state.lock().fail_authorization = Some(OsStatus {
            code,
            message: message.to_string(),
        });
    }

    /// Makes opening a session fail.
    pub fn fail_session(&self, message: &str) {
        self.state.lock().fail_session = Some(message.to_string());
    }

    /// Makes staging a write for `service_id` fail.
    pub fn fail_set_for(&self, service_id: &str) {
        self.state.lock().fail_set.insert(service_id.to_string());
    }

    /// Makes commits fail.
    pub fn fail_commit(&self) {
        self.state.lock().fail_commit = true;
    }

    /// Makes applies fail.
    pub fn fail_apply(&self) {
        self.state.lock().fail_apply = true;
    }

    /// Clears every injected failure.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_authorization = None;
        state.fail_session = None;
        state.fail_set.clear();
        state.fail_commit = false;
        state.fail_apply = false;
    }

    /// Committed writes as `(path, dictionary)`, oldest first.
    pub fn writes(&self) -> Vec<(String, ProxyDict)> {
        self.state.lock().writes.clone()
    }

    /// Backend calls in order.
    pub fn call_log(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// Number of successful authorizations.
    pub fn authorizations_acquired(&self) -> usize {
        self.state.lock().acquired
    }

    /// Number of released authorizations.
    pub fn authorizations_released(&self) -> usize {
        self.state.lock().released
    }

    /// Flags of the most recent authorization request.
    pub fn last_authorization_flags(&self) -> Option<AuthorizationFlags> {
        self.state.lock().last_flags
    }

    /// Number of successful commits.
    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }

    /// Number of successful applies.
    pub fn applies(&self) -> usize {
        self.state.lock().applies
    }

    /// Number of synchronizations.
    pub fn synchronizes(&self) -> usize {
        self.state.lock().synchronizes
    }
}

/// Credential handed out by [`MemoryPreferences`]; counts its release.
#[derive(Debug)]
pub struct MemoryAuthorization {
    state: Arc<Mutex<State>>,
}

impl Drop for MemoryAuthorization {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.released += 1;
        state.calls.push("release");
    }
}

/// Session handed out by [`MemoryPreferences`].
#[derive(Debug)]
pub struct MemorySession {
    state: Arc<Mutex<State>>,
    pending: Vec<(Vec<String>, ProxyDict)>,
}

impl SystemPreferences for MemoryPreferences {
    type Authorization = MemoryAuthorization;
    type Session = MemorySession;

    fn acquire_authorization(
        &self,
        flags: AuthorizationFlags,
    ) -> std::result::Result<Self::Authorization, OsStatus> {
        let mut state = self.state.lock();
        state.calls.push("authorize");
        state.last_flags = Some(flags);
        if let Some(status) = state.fail_authorization.clone() {
            return Err(status);
        }
        state.acquired += 1;

        Ok(MemoryAuthorization {
            state: Arc::clone(&self.state),
        })
    }

    fn open_session(
        &self,
        _name: &str,
        _authorization: &Self::Authorization,
    ) -> std::result::Result<Self::Session, PreferencesError> {
        let mut state = self.state.lock();
        state.calls.push("open");
        if let Some(message) = &state.fail_session {
            return Err(PreferencesError::new(message.clone()));
        }

        Ok(MemorySession {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
        })
    }
}

impl PreferencesSession for MemorySession {
    fn get_value(&self, key: &str) -> Option<PrefValue> {
        let state = self.state.lock();
        if key == NETWORK_SERVICES && !state.services.is_empty() {
            Some(PrefValue::Dictionary(state.services.clone()))
        } else {
            None
        }
    }

    fn set_path_value(
        &mut self,
        path: &str,
        value: &ProxyDict,
    ) -> std::result::Result<(), PreferencesError> {
        let mut state = self.state.lock();
        state.calls.push("set");

        let components: Vec<String> = path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        let [root, service_id, ..] = components.as_slice() else {
            return Err(PreferencesError::new(format!("invalid path {}", path)));
        };
        if root != NETWORK_SERVICES {
            return Err(PreferencesError::new(format!("invalid path {}", path)));
        }
        if state.fail_set.contains(service_id) {
            return Err(PreferencesError::new("permission denied"));
        }

        self.pending.push((components, value.clone()));
        Ok(())
    }

    fn commit(&mut self) -> std::result::Result<(), PreferencesError> {
        let mut state = self.state.lock();
        state.calls.push("commit");
        if state.fail_commit {
            return Err(PreferencesError::new("commit failed"));
        }

        for (components, value) in self.pending.drain(..) {
            // Skip the leading `NetworkServices` component.
            set_path(&mut state.services, &components[1..], value.clone());
            state.writes.push((format!("/{}", components.join("/")), value));
        }
        state.commits += 1;
        Ok(())
    }

    fn apply(&mut self) -> std::result::Result<(), PreferencesError> {
        let mut state = self.state.lock();
        state.calls.push("apply");
        if state.fail_apply {
            return Err(PreferencesError::new("apply failed"));
        }
        state.applies += 1;
        Ok(())
    }

    fn synchronize(&mut self) {
        let mut state = self.state.lock();
        state.calls.push("synchronize");
        state.synchronizes += 1;
    }
}

fn set_path(tree: &mut BTreeMap<String, PrefValue>, components: &[String], value: ProxyDict) {
    match components {
        [] => {}
        [last] => {
            tree.insert(last.clone(), PrefValue::Dictionary(value));
        }
        [first, rest @ ..] => {
            let child = tree
                .entry(first.clone())
                .or_insert_with(|| PrefValue::Dictionary(BTreeMap::new()));
            if child.as_dict().is_none() {
                *child = PrefValue::Dictionary(BTreeMap::new());
            }
            if let Some(dict) = child.as_dict_mut() {
                set_path(dict, rest, value);
            }
        }
    }
}
