//! Periodic task scheduling.
//!
//! Two independently timed loops share one `AgentCore` behind a single
//! mutex, so at most one replace-or-restart sequence executes at a
//! time. The update loop waits its turn; the liveness loop degrades to
//! a skip when the lock is held rather than queueing behind a running
//! replace. Both loops run their body once, synchronously, at startup
//! before the periodic cadence begins, and check the shutdown token at
//! every iteration boundary.

use crate::config::Config;
use crate::coordinator::{UpdateCoordinator, UpdateOutcome};
use crate::fetcher::ArtifactFetcher;
use crate::inventory::LocalInventory;
use crate::oracle::VersionOracle;
use crate::supervisor::{ProcessControl, ProcessSupervisor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a liveness tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum LivenessOutcome {
    /// The managed artifact is executing; nothing to do.
    Running,
    /// Artifact was down and its file still exists: one start attempt,
    /// no replace sequence.
    Restarted(String),
    /// Start attempt failed; next tick retries.
    RestartFailed,
    /// No artifact on disk at all: ran the full update sequence.
    Recovered(UpdateOutcome),
}

/// All mutable agent state, serialized behind one lock.
pub struct AgentCore {
    supervisor: Box<dyn ProcessControl>,
    coordinator: UpdateCoordinator,
}

impl AgentCore {
    pub fn from_config(config: &Config) -> Self {
        let dir = config.managed_dir();
        let supervisor = ProcessSupervisor::new(&config.artifact.process_match, dir.clone());
        Self::with_process_control(config, Box::new(supervisor))
    }

    /// Build a core with a caller-supplied process-control seam.
    pub fn with_process_control(config: &Config, supervisor: Box<dyn ProcessControl>) -> Self {
        let dir = config.managed_dir();
        let coordinator = UpdateCoordinator::new(
            VersionOracle::new(
                config.remote.version_url.clone(),
                Duration::from_secs(config.remote.oracle_timeout_secs),
            ),
            ArtifactFetcher::new(
                config.remote.download_url.clone(),
                Duration::from_secs(config.remote.download_timeout_secs),
                dir.clone(),
            ),
            LocalInventory::new(
                dir,
                &config.artifact.extension,
                &config.artifact.reserved_filenames,
            ),
            config.kill_grace(),
            config.settle_delay(),
        );
        Self {
            supervisor,
            coordinator,
        }
    }

    /// Liveness tick body: restart a crashed artifact, or treat "no
    /// artifact" as "needs update" and run the full sequence.
    pub async fn liveness_pass(&mut self) -> LivenessOutcome {
        if self.supervisor.is_running() {
            return LivenessOutcome::Running;
        }

        if let Some(local) = self.coordinator.inventory().current() {
            info!("managed process down, restarting {}", local.filename);
            return match self.supervisor.start(&local.filename) {
                Ok(()) => LivenessOutcome::Restarted(local.filename),
                Err(e) => {
                    warn!("restart failed: {}", e);
                    LivenessOutcome::RestartFailed
                }
            };
        }

        info!("managed process down and no local artifact, fetching one");
        LivenessOutcome::Recovered(self.update_pass().await)
    }

    /// Update tick body: one reconciliation against the authority.
    pub async fn update_pass(&mut self) -> UpdateOutcome {
        self.coordinator.reconcile(self.supervisor.as_mut()).await
    }
}

/// Runs a liveness tick unless a replace-or-restart sequence already
/// holds the core. Returns false when the tick was skipped.
pub async fn try_liveness_tick(core: &Arc<Mutex<AgentCore>>) -> bool {
    match core.try_lock() {
        Ok(mut core) => {
            core.liveness_pass().await;
            true
        }
        Err(_) => {
            debug!("liveness tick skipped: core busy with another sequence");
            false
        }
    }
}

pub struct Scheduler {
    core: Arc<Mutex<AgentCore>>,
    liveness_interval: Duration,
    update_interval: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(core: Arc<Mutex<AgentCore>>, config: &Config, shutdown: CancellationToken) -> Self {
        Self {
            core,
            liveness_interval: config.liveness_interval(),
            update_interval: config.update_interval(),
            shutdown,
        }
    }

    /// Startup passes, then both loops until the shutdown token fires.
    pub async fn run(self) {
        {
            // Synchronous first pass: the artifact is started (or
            // fetched) immediately, not after the first period.
            let mut core = self.core.lock().await;
            core.liveness_pass().await;
            core.update_pass().await;
        }

        let liveness = self.spawn_liveness_loop();
        let update = self.spawn_update_loop();
        let _ = tokio::join!(liveness, update);
        info!("scheduler stopped");
    }

    fn spawn_liveness_loop(&self) -> tokio::task::JoinHandle<()> {
        let core = Arc::clone(&self.core);
        let period = self.liveness_interval;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("liveness loop stopping");
                        break;
                    }
                    _ = tokio::time::sleep(period) => {}
                }
                try_liveness_tick(&core).await;
            }
        })
    }

    fn spawn_update_loop(&self) -> tokio::task::JoinHandle<()> {
        let core = Arc::clone(&self.core);
        let period = self.update_interval;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("update loop stopping");
                        break;
                    }
                    _ = tokio::time::sleep(period) => {}
                }
                // Serialized with liveness: once a sequence starts it
                // runs to completion, so this only waits, never races.
                core.lock().await.update_pass().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_common::AgentError;

    struct StubControl {
        running: bool,
        starts: Arc<AtomicUsize>,
        kills: Arc<AtomicUsize>,
    }

    impl ProcessControl for StubControl {
        fn is_running(&mut self) -> bool {
            self.running
        }
        fn terminate_all(&mut self) {
            self.kills.fetch_add(1, Ordering::SeqCst);
        }
        fn start(&mut self, _filename: &str) -> Result<(), AgentError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.running = true;
            Ok(())
        }
    }

    fn test_config(dir: PathBuf) -> Config {
        let mut config = Config::default();
        config.artifact.managed_dir = Some(dir);
        // No live authority in these tests; the oracle call fails fast.
        config.remote.version_url = "http://127.0.0.1:1/version".to_string();
        config.remote.download_url = "http://127.0.0.1:1/download".to_string();
        config.remote.oracle_timeout_secs = 1;
        config.schedule.kill_grace_secs = 0;
        config.schedule.settle_delay_secs = 0;
        config
    }

    #[tokio::test]
    async fn downed_artifact_with_file_gets_exactly_one_start() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tracker_v1.0.exe"), b"bin").unwrap();

        let starts = Arc::new(AtomicUsize::new(0));
        let kills = Arc::new(AtomicUsize::new(0));
        let config = test_config(dir.path().to_path_buf());
        let mut core = AgentCore::with_process_control(
            &config,
            Box::new(StubControl {
                running: false,
                starts: Arc::clone(&starts),
                kills: Arc::clone(&kills),
            }),
        );

        let outcome = core.liveness_pass().await;
        assert_eq!(outcome, LivenessOutcome::Restarted("tracker_v1.0.exe".to_string()));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        // Restart path never invokes the replace sequence.
        assert_eq!(kills.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn running_artifact_needs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let starts = Arc::new(AtomicUsize::new(0));
        let kills = Arc::new(AtomicUsize::new(0));
        let config = test_config(dir.path().to_path_buf());
        let mut core = AgentCore::with_process_control(
            &config,
            Box::new(StubControl {
                running: true,
                starts: Arc::clone(&starts),
                kills: Arc::clone(&kills),
            }),
        );

        assert_eq!(core.liveness_pass().await, LivenessOutcome::Running);
        assert_eq!(starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_artifact_escalates_to_update_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let starts = Arc::new(AtomicUsize::new(0));
        let kills = Arc::new(AtomicUsize::new(0));
        let config = test_config(dir.path().to_path_buf());
        let mut core = AgentCore::with_process_control(
            &config,
            Box::new(StubControl {
                running: false,
                starts: Arc::clone(&starts),
                kills: Arc::clone(&kills),
            }),
        );

        // Oracle is unreachable, so the escalated sequence reports
        // NoRemote and the artifact stays absent until a later tick.
        let outcome = core.liveness_pass().await;
        assert_eq!(outcome, LivenessOutcome::Recovered(UpdateOutcome::NoRemote));
        assert_eq!(starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn liveness_tick_skips_while_core_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let starts = Arc::new(AtomicUsize::new(0));
        let kills = Arc::new(AtomicUsize::new(0));
        let config = test_config(dir.path().to_path_buf());
        let core = Arc::new(Mutex::new(AgentCore::with_process_control(
            &config,
            Box::new(StubControl {
                running: false,
                starts: Arc::clone(&starts),
                kills: Arc::clone(&kills),
            }),
        )));

        let guard = core.lock().await;
        // Another sequence holds the core: the tick must skip, not block.
        assert!(!try_liveness_tick(&core).await);
        drop(guard);
        assert!(try_liveness_tick(&core).await);
    }
}
