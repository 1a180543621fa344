//! Persisted install record.
//!
//! One small JSON file in the managed directory naming the artifact the
//! agent last installed. It is the preferred source of truth for local
//! state; directory scanning remains as the bootstrap/repair fallback
//! when the record is missing, corrupt, or names a file that no longer
//! exists. Written atomically (temp file + rename) so a crash mid-write
//! never leaves a half-record behind.

use crate::artifact::{ArtifactIdentity, ArtifactVersion};
use crate::error::AgentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Record filename inside the managed directory.
pub const RECORD_FILENAME: &str = "installed.json";

/// The artifact the agent currently considers installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub filename: String,
    pub version: ArtifactVersion,
    pub updated_at: DateTime<Utc>,
}

impl InstallRecord {
    pub fn new(identity: &ArtifactIdentity) -> Self {
        Self {
            filename: identity.filename.clone(),
            version: identity.version,
            updated_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> ArtifactIdentity {
        ArtifactIdentity {
            filename: self.filename.clone(),
            version: self.version,
        }
    }

    /// Load the record from `dir`, or None if missing or unreadable.
    pub fn load(dir: &Path) -> Option<InstallRecord> {
        let path = dir.join(RECORD_FILENAME);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                debug!("no install record at {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("corrupt install record at {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write the record into `dir` via temp file + rename.
    pub fn save(&self, dir: &Path) -> Result<(), AgentError> {
        let path = dir.join(RECORD_FILENAME);
        let tmp = dir.join(format!("{RECORD_FILENAME}.tmp"));
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AgentError::Filesystem(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove the record from `dir`, ignoring a missing file.
    pub fn clear(dir: &Path) {
        let _ = fs::remove_file(dir.join(RECORD_FILENAME));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let identity = ArtifactIdentity::from_filename("tracker_v1.5.exe");
        let record = InstallRecord::new(&identity);

        record.save(dir.path()).unwrap();
        let loaded = InstallRecord::load(dir.path()).unwrap();
        assert_eq!(loaded.filename, "tracker_v1.5.exe");
        assert_eq!(loaded.version, ArtifactVersion { major: 1, minor: 5 });
    }

    #[test]
    fn missing_record_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(InstallRecord::load(dir.path()).is_none());
    }

    #[test]
    fn corrupt_record_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RECORD_FILENAME), "{not json").unwrap();
        assert!(InstallRecord::load(dir.path()).is_none());
    }

    #[test]
    fn clear_tolerates_missing_record() {
        let dir = tempfile::tempdir().unwrap();
        InstallRecord::clear(dir.path());

        let identity = ArtifactIdentity::from_filename("tracker_v2.0.exe");
        InstallRecord::new(&identity).save(dir.path()).unwrap();
        InstallRecord::clear(dir.path());
        assert!(InstallRecord::load(dir.path()).is_none());
    }
}
