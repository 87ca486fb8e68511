//! Key-value persistence seam behind [`ConfigurationStore`](crate::ConfigurationStore).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;

/// Raw key-value persistence for user settings.
///
/// Values are JSON so that each key keeps its native type. Implementations do
/// not validate anything; typing and defaults live in the store on top.
pub trait SettingsBackend: Send + Sync {
    /// Returns the stored value for `key`, if any.
    fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_value(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Removes `key`. Returns whether a value was present.
    fn remove_value(&self, key: &str) -> Result<bool>;
}

impl<B: SettingsBackend + ?Sized> SettingsBackend for Arc<B> {
    fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        (**self).get_value(key)
    }

    fn set_value(&self, key: &str, value: serde_json::Value) -> Result<()> {
        (**self).set_value(key, value)
    }

    fn remove_value(&self, key: &str) -> Result<bool> {
        (**self).remove_value(key)
    }
}

/// In-memory settings backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsBackend for MemoryBackend {
    fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set_value(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove_value(&self, key: &str) -> Result<bool> {
        Ok(self.values.write().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get_value("Port").unwrap(), None);

        backend.set_value("Port", json!(8000)).unwrap();
        assert_eq!(backend.get_value("Port").unwrap(), Some(json!(8000)));

        assert!(backend.remove_value("Port").unwrap());
        assert!(!backend.remove_value("Port").unwrap());
    }

    #[test]
    fn test_shared_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let other = Arc::clone(&backend);

        other.set_value("Autostart", json!(true)).unwrap();
        assert_eq!(backend.get_value("Autostart").unwrap(), Some(json!(true)));
    }
}
