//! Update coordination.
//!
//! One reconciliation tick walks Idle → Comparing → Replacing{Killing,
//! Deleting, Downloading, Starting} → Idle. The sequence is
//! deliberately best-effort and non-transactional: every step can fail
//! independently, failures are logged and typed, and the coordinator
//! always returns to Idle for the next scheduled attempt rather than
//! rolling back. A download failure after the delete step leaves a
//! window with no managed artifact at all; the next tick repairs it.

use crate::fetcher::ArtifactFetcher;
use crate::inventory::LocalInventory;
use crate::oracle::{RemoteState, VersionOracle};
use crate::supervisor::ProcessControl;
use std::fs;
use std::time::Duration;
use tracing::{debug, info, warn};
use warden_common::{ArtifactIdentity, InstallRecord};

/// Replace-sequence step names, for logging and abort reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceStep {
    Killing,
    Deleting,
    Downloading,
    Starting,
}

/// What a reconciliation tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Oracle unreachable, nothing published, or malformed response.
    NoRemote,
    /// Advertised filename equals the installed one; nothing touched.
    UpToDate,
    /// Replace sequence ran to its end; the new identity is installed.
    /// The start attempt itself may still have failed.
    Replaced(ArtifactIdentity),
    /// Replace sequence aborted at the named step.
    Aborted(ReplaceStep),
}

pub struct UpdateCoordinator {
    oracle: VersionOracle,
    fetcher: ArtifactFetcher,
    inventory: LocalInventory,
    kill_grace: Duration,
    settle_delay: Duration,
}

impl UpdateCoordinator {
    pub fn new(
        oracle: VersionOracle,
        fetcher: ArtifactFetcher,
        inventory: LocalInventory,
        kill_grace: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            oracle,
            fetcher,
            inventory,
            kill_grace,
            settle_delay,
        }
    }

    pub fn inventory(&self) -> &LocalInventory {
        &self.inventory
    }

    /// Comparing step: fetch remote state, decide, and run the replace
    /// sequence when the advertised filename differs from the local one.
    pub async fn reconcile(&self, supervisor: &mut dyn ProcessControl) -> UpdateOutcome {
        let remote = match self.oracle.fetch().await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("oracle fetch failed, retrying next tick: {}", e);
                return UpdateOutcome::NoRemote;
            }
        };

        if !remote.usable() {
            debug!("authority has nothing published");
            return UpdateOutcome::NoRemote;
        }

        let local = self.inventory.current();
        if let Some(local) = &local {
            // Filename inequality, not version ordering, triggers the
            // replace: two filenames can encode the same digits.
            if local.same_artifact(&remote.filename) {
                debug!("up to date: {}", local.filename);
                return UpdateOutcome::UpToDate;
            }
        }

        info!(
            "replacing {} with {}",
            local.as_ref().map(|l| l.filename.as_str()).unwrap_or("<none>"),
            remote.filename
        );
        self.replace(supervisor, local, remote).await
    }

    /// Killing → Deleting → Downloading → Starting.
    async fn replace(
        &self,
        supervisor: &mut dyn ProcessControl,
        local: Option<ArtifactIdentity>,
        remote: RemoteState,
    ) -> UpdateOutcome {
        // Killing: best-effort sweep, then a fixed grace period. No
        // verification that termination succeeded before continuing.
        supervisor.terminate_all();
        tokio::time::sleep(self.kill_grace).await;

        // Deleting: the old artifact and the record naming it.
        if let Some(old) = &local {
            let path = self.inventory.artifact_path(&old.filename);
            match fs::remove_file(&path) {
                Ok(()) => info!("deleted {}", old.filename),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("delete of {} failed: {}", old.filename, e),
            }
            InstallRecord::clear(self.inventory.dir());
        }

        // Downloading: abort leaves the artifact absent until the next
        // tick runs the sequence again from scratch.
        if let Err(e) = self.fetcher.download(&remote.filename).await {
            warn!("download of {} failed: {}", remote.filename, e);
            return UpdateOutcome::Aborted(ReplaceStep::Downloading);
        }
        tokio::time::sleep(self.settle_delay).await;

        // Starting: record first (the artifact is installed whether or
        // not it launches), then start; return to Idle regardless.
        let identity = ArtifactIdentity::from_filename(remote.filename.clone());
        if let Err(e) = InstallRecord::new(&identity).save(self.inventory.dir()) {
            warn!("install record write failed: {}", e);
        }
        if let Err(e) = supervisor.start(&identity.filename) {
            warn!("start of {} failed: {}", identity.filename, e);
        }

        UpdateOutcome::Replaced(identity)
    }
}
