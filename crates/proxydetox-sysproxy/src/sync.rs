//! Routes system HTTP/HTTPS traffic to the local engine, or stops doing so.
//!
//! ## Run
//!
//! ```text
//! Idle → Authorizing → SessionOpen → Enumerating → Diffing ─┬─ changes ──→ Committing → Done
//!                                                            └─ no changes ─────────────→ Done
//! (any step) → Failed
//! ```
//!
//! Failures before the per-service loop abort the run with nothing written.
//! Per-service failures are recorded and the loop continues. Commit and apply
//! failures end the run and leave earlier writes in place. Nothing is retried.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::authorization;
use crate::backend::{AuthorizationFlags, SystemPreferences};
use crate::differ;
use crate::error::Result;
use crate::services;
use crate::transaction::{PreferencesTransaction, ServiceOutcome};

/// Name the preferences session is opened under.
pub const SESSION_NAME: &str = "Proxydetox";

/// Phase of a synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Not started.
    Idle,
    /// Waiting for a privileged credential.
    Authorizing,
    /// Preferences session open.
    SessionOpen,
    /// Reading network services.
    Enumerating,
    /// Comparing and staging per service.
    Diffing,
    /// Committing, applying and synchronizing.
    Committing,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Authorizing => "authorizing",
            Self::SessionOpen => "session-open",
            Self::Enumerating => "enumerating",
            Self::Diffing => "diffing",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    /// Target port, `0` for disabled.
    pub port: u16,
    /// One entry per eligible service.
    pub outcomes: Vec<ServiceOutcome>,
    /// Whether the batch was committed and applied.
    pub committed: bool,
}

impl SyncReport {
    /// Number of services whose write was staged.
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.written).count()
    }

    /// Number of services whose write failed.
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }
}

/// Orchestrates authorization, enumeration, diffing and the write batch.
pub struct SystemProxySynchronizer<P> {
    prefs: P,
    flags: AuthorizationFlags,
}

impl<P: SystemPreferences> SystemProxySynchronizer<P> {
    /// Creates a synchronizer over `prefs`.
    pub fn new(prefs: P) -> Self {
        Self {
            prefs,
            flags: AuthorizationFlags::SYNC,
        }
    }

    /// Returns the preferences backend.
    pub fn prefs(&self) -> &P {
        &self.prefs
    }

    /// Points every Wi-Fi and Ethernet service at `127.0.0.1:port`, or
    /// disables the HTTP/HTTPS proxies when `port` is `0`.
    ///
    /// Blocks while the user answers an authorization prompt.
    pub fn run(&self, port: u16) -> Result<SyncReport> {
        let mut phase = SyncPhase::Idle;
        let result = self.run_phases(port, &mut phase);

        match &result {
            Ok(report) => {
                transition(&mut phase, SyncPhase::Done);
                info!(
                    "System proxy sync for port {} done: {} written, {} failed, committed={}",
                    port,
                    report.written(),
                    report.failed(),
                    report.committed
                );
            }
            Err(e) => {
                debug!("Run failed during {}: {}", phase, e);
                transition(&mut phase, SyncPhase::Failed);
            }
        }

        result
    }

    fn run_phases(&self, port: u16, phase: &mut SyncPhase) -> Result<SyncReport> {
        transition(phase, SyncPhase::Authorizing);
        // Released at the end of this function on every path.
        let authorization = authorization::acquire(&self.prefs, self.flags)?;

        let mut session = self
            .prefs
            .open_session(SESSION_NAME, &authorization)
            .map_err(crate::error::SyncError::Session)?;
        transition(phase, SyncPhase::SessionOpen);

        transition(phase, SyncPhase::Enumerating);
        let records = services::enumerate(&session);
        debug!("Found {} network services", records.len());

        transition(phase, SyncPhase::Diffing);
        let desired = differ::desired(port);
        let mut tx = PreferencesTransaction::new(&mut session);
        for record in &records {
            if !record.hardware.is_write_eligible() {
                debug!(
                    "Skipping {} ({}): not Wi-Fi or Ethernet",
                    record.service_id, record.hardware
                );
                continue;
            }

            if differ::needs_write(record.current_proxies.as_ref(), &desired) {
                tx.stage(record, &desired);
            } else {
                debug!("{} already up to date", record.service_id);
                tx.unchanged(record);
            }
        }

        if tx.is_dirty() {
            transition(phase, SyncPhase::Committing);
        }
        let (outcomes, committed) = tx.finish()?;

        Ok(SyncReport {
            port,
            outcomes,
            committed,
        })
    }
}

fn transition(phase: &mut SyncPhase, next: SyncPhase) {
    debug!("System proxy sync: {} -> {}", phase, next);
    *phase = next;
}
