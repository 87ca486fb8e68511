//! Batched per-service writes against an open preferences session.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::backend::PreferencesSession;
use crate::error::{Result, ServiceWriteError, SyncError};
use crate::services::NetworkServiceRecord;
use crate::value::ProxyDict;

/// What happened to one eligible service during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceOutcome {
    /// Service identifier.
    pub service_id: String,
    /// Whether a write was staged.
    pub written: bool,
    /// Staging failure, if any.
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ServiceWriteError>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<ServiceWriteError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Stages writes for individual services, then commits them as one batch.
///
/// A failed stage is recorded and processing continues. Nothing is rolled back
/// if the commit or apply step fails.
pub struct PreferencesTransaction<'s, S: PreferencesSession> {
    session: &'s mut S,
    outcomes: Vec<ServiceOutcome>,
    dirty: bool,
}

impl<'s, S: PreferencesSession> PreferencesTransaction<'s, S> {
    /// Starts a transaction on `session`.
    pub fn new(session: &'s mut S) -> Self {
        Self {
            session,
            outcomes: Vec::new(),
            dirty: false,
        }
    }

    /// Records that `service` already matches and needs no write.
    pub fn unchanged(&mut self, service: &NetworkServiceRecord) {
        self.outcomes.push(ServiceOutcome {
            service_id: service.service_id.clone(),
            written: false,
            error: None,
        });
    }

    /// Stages `proxies` as the new proxy dictionary of `service`.
    ///
    /// Returns whether the write was staged. A service whose stage was
    /// attempted marks the batch dirty, even if the backend rejected it.
    pub fn stage(&mut self, service: &NetworkServiceRecord, proxies: &ProxyDict) -> bool {
        self.dirty = true;
        let path = service.proxies_path();

        let error = match self.session.set_path_value(&path, proxies) {
            Ok(()) => {
                info!(
                    "Staged proxy settings for {} ({})",
                    service.service_id, service.hardware
                );
                None
            }
            Err(source) => {
                let err = ServiceWriteError {
                    service_id: service.service_id.clone(),
                    source,
                };
                warn!("{}", err);
                Some(err)
            }
        };

        let written = error.is_none();
        self.outcomes.push(ServiceOutcome {
            service_id: service.service_id.clone(),
            written,
            error,
        });
        written
    }

    /// Returns whether any write was attempted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Commits, applies and synchronizes the batch, in that order.
    ///
    /// Does nothing when no write was attempted. Returns the per-service
    /// outcomes and whether a commit happened.
    pub fn finish(self) -> Result<(Vec<ServiceOutcome>, bool)> {
        if !self.dirty {
            return Ok((self.outcomes, false));
        }

        self.session.commit().map_err(|e| {
            error!("Failed to commit System Configuration Preferences: {}", e);
            SyncError::Commit(e)
        })?;

        self.session.apply().map_err(|e| {
            error!("Failed to apply System Configuration Preferences: {}", e);
            SyncError::Apply(e)
        })?;

        self.session.synchronize();
        info!("System Configuration Preferences committed and applied");

        Ok((self.outcomes, true))
    }
}
