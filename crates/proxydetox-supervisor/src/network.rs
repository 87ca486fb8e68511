//! Internal-network availability.
//!
//! An external notifier reports whether the corporate network is reachable.
//! The value is only recorded; nothing else reacts to it.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

/// Latest internal-network availability, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct InternalNetwork {
    available: Arc<RwLock<Option<bool>>>,
}

impl InternalNetwork {
    /// Creates a holder with no report yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a report from the notifier.
    pub fn set_available(&self, available: bool) {
        let previous = self.available.write().replace(available);
        if previous != Some(available) {
            info!("Internal network available: {}", available);
        }
    }

    /// Latest report, `None` before the first one.
    pub fn is_available(&self) -> Option<bool> {
        *self.available.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_until_reported() {
        let network = InternalNetwork::new();
        assert_eq!(network.is_available(), None);
    }

    #[test]
    fn test_latest_report_wins() {
        let network = InternalNetwork::new();
        network.set_available(true);
        network.set_available(false);
        assert_eq!(network.is_available(), Some(false));
    }

    #[test]
    fn test_clones_share_state() {
        let network = InternalNetwork::new();
        let notifier = network.clone();

        notifier.set_available(true);
        assert_eq!(network.is_available(), Some(true));
    }
}
