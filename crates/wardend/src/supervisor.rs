//! Managed process supervision.
//!
//! The supervisor retains the `Child` handle of the artifact it spawned
//! and consults it first. The case-insensitive name-substring scan over
//! the OS process table is the recovery path: it rediscovers an
//! artifact started by a previous agent run, and it is the sweep
//! mechanism for kills (an owned handle can never cover processes the
//! agent did not spawn). Per-process enumeration faults are skipped,
//! never fatal.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use sysinfo::System;
use tracing::{debug, info, warn};
use warden_common::AgentError;

/// Seam for the update coordinator and liveness loop; lets tests swap
/// real process control for a recorder.
pub trait ProcessControl: Send {
    /// True iff the managed artifact is currently executing.
    fn is_running(&mut self) -> bool;

    /// Best-effort forceful kill of every matching process. A process
    /// that resists termination is silently left running.
    fn terminate_all(&mut self);

    /// Launch the artifact detached, with the managed directory as its
    /// working directory.
    fn start(&mut self, filename: &str) -> Result<(), AgentError>;
}

pub struct ProcessSupervisor {
    /// Lowercased substring matched against process names
    needle: String,
    managed_dir: PathBuf,
    child: Option<Child>,
    system: System,
}

impl ProcessSupervisor {
    pub fn new(process_match: &str, managed_dir: PathBuf) -> Self {
        Self {
            needle: process_match.to_lowercase(),
            managed_dir,
            child: None,
            system: System::new(),
        }
    }

    /// Substring scan of the process table.
    fn scan_is_running(&mut self) -> bool {
        self.system.refresh_processes();
        self.system
            .processes()
            .values()
            .any(|p| p.name().to_lowercase().contains(&self.needle))
    }
}

impl ProcessControl for ProcessSupervisor {
    fn is_running(&mut self) -> bool {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(None) => return true,
                Ok(Some(status)) => {
                    debug!("managed process exited with {}", status);
                    self.child = None;
                }
                Err(e) => {
                    debug!("cannot poll managed process: {}", e);
                    self.child = None;
                }
            }
        }
        // No live handle: fall back to the process-table scan so an
        // artifact started before the agent restarted is still found.
        self.scan_is_running()
    }

    fn terminate_all(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("kill of owned process failed: {}", e);
            }
            let _ = child.wait();
        }

        self.system.refresh_processes();
        for (pid, process) in self.system.processes() {
            if !process.name().to_lowercase().contains(&self.needle) {
                continue;
            }
            if process.kill() {
                info!("terminated {} (pid {})", process.name(), pid);
            } else {
                warn!("process {} (pid {}) resisted termination", process.name(), pid);
            }
        }
    }

    fn start(&mut self, filename: &str) -> Result<(), AgentError> {
        let path = self.managed_dir.join(filename);
        if !path.exists() {
            return Err(AgentError::process(format!(
                "artifact missing: {}",
                path.display()
            )));
        }

        let mut cmd = Command::new(&path);
        cmd.current_dir(&self.managed_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            // Own process group: the artifact survives the agent and
            // never receives the agent's terminal signals.
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        match cmd.spawn() {
            Ok(child) => {
                info!("started {} (pid {})", filename, child.id());
                self.child = Some(child);
                Ok(())
            }
            Err(e) => Err(AgentError::process(format!("spawn of {} failed: {}", filename, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_of_missing_artifact_is_a_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = ProcessSupervisor::new("tracker", dir.path().to_path_buf());
        let err = sup.start("tracker_v1.5.exe").unwrap_err();
        assert!(matches!(err, AgentError::Process(_)));
        assert!(!sup.is_running());
    }

    #[test]
    #[cfg(unix)]
    fn owned_handle_reports_running_then_exited() {
        let dir = tempfile::tempdir().unwrap();
        // A real spawnable artifact: a shell script that sleeps briefly.
        let name = "sleeper_v1.0.exe";
        let path = dir.path().join(name);
        std::fs::write(&path, "#!/bin/sh\nsleep 30\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        // Needle chosen to never match by scan, so only the owned
        // handle can report liveness.
        let mut sup = ProcessSupervisor::new("sleeper_v1", dir.path().to_path_buf());
        sup.start(name).unwrap();
        assert!(sup.is_running());

        sup.terminate_all();
        assert!(!sup.is_running());
    }
}
