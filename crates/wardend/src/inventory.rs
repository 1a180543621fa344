//! Local artifact inventory.
//!
//! Answers "which artifact is installed right now". The persisted
//! install record is preferred when it names a file that still exists;
//! otherwise the managed directory is scanned: entries filtered by the
//! configured extension, the reserved-name set excluded, first match
//! wins. An unreadable directory yields None so the loops keep running
//! through transient filesystem faults.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use warden_common::{ArtifactIdentity, InstallRecord};

pub struct LocalInventory {
    dir: PathBuf,
    /// Lowercased extension suffix, e.g. ".exe"
    suffix: String,
    /// Lowercased reserved filenames, never the managed artifact
    reserved: Vec<String>,
}

impl LocalInventory {
    pub fn new(dir: PathBuf, extension: &str, reserved: &[String]) -> Self {
        Self {
            dir,
            suffix: format!(".{}", extension.to_lowercase()),
            reserved: reserved.iter().map(|r| r.to_lowercase()).collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of an artifact filename inside the managed dir.
    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// The installed artifact: install record first, scan as fallback.
    pub fn current(&self) -> Option<ArtifactIdentity> {
        if let Some(record) = InstallRecord::load(&self.dir) {
            if self.dir.join(&record.filename).exists() {
                return Some(record.identity());
            }
            debug!(
                "install record names missing file {}, falling back to scan",
                record.filename
            );
        }
        self.scan()
    }

    /// First directory entry matching the extension filter, reserved
    /// names excluded. Directory order decides ties between multiple
    /// coexisting artifacts.
    pub fn scan(&self) -> Option<ArtifactIdentity> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("cannot read {}: {}", self.dir.display(), e);
                return None;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let lower = name.to_lowercase();
            if !lower.ends_with(&self.suffix) {
                continue;
            }
            if self.reserved.iter().any(|r| *r == lower) {
                continue;
            }
            return Some(ArtifactIdentity::from_filename(name));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::ArtifactVersion;

    fn reserved() -> Vec<String> {
        vec!["wardend.exe".to_string(), "wardend_service.exe".to_string()]
    }

    #[test]
    fn scan_finds_artifact_and_parses_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tracker_v1.5.exe"), b"bin").unwrap();

        let inv = LocalInventory::new(dir.path().to_path_buf(), "exe", &reserved());
        let found = inv.scan().unwrap();
        assert_eq!(found.filename, "tracker_v1.5.exe");
        assert_eq!(found.version, ArtifactVersion { major: 1, minor: 5 });
    }

    #[test]
    fn scan_excludes_reserved_names_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("WARDEND.EXE"), b"agent").unwrap();
        fs::write(dir.path().join("wardend_service.exe"), b"wrapper").unwrap();

        let inv = LocalInventory::new(dir.path().to_path_buf(), "exe", &reserved());
        assert!(inv.scan().is_none());
    }

    #[test]
    fn scan_ignores_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tracker_v1.5.msi"), b"not it").unwrap();
        fs::write(dir.path().join("installed.json"), b"{}").unwrap();

        let inv = LocalInventory::new(dir.path().to_path_buf(), "exe", &reserved());
        assert!(inv.scan().is_none());
    }

    #[test]
    fn unreadable_directory_yields_none() {
        let inv = LocalInventory::new(PathBuf::from("/nonexistent/warden"), "exe", &reserved());
        assert!(inv.current().is_none());
    }

    #[test]
    fn record_wins_over_scan_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tracker_v1.0.exe"), b"old").unwrap();
        fs::write(dir.path().join("tracker_v1.5.exe"), b"new").unwrap();
        let recorded = ArtifactIdentity::from_filename("tracker_v1.5.exe");
        InstallRecord::new(&recorded).save(dir.path()).unwrap();

        let inv = LocalInventory::new(dir.path().to_path_buf(), "exe", &reserved());
        assert_eq!(inv.current().unwrap().filename, "tracker_v1.5.exe");
    }

    #[test]
    fn stale_record_falls_back_to_scan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tracker_v1.0.exe"), b"old").unwrap();
        let gone = ArtifactIdentity::from_filename("tracker_v9.9.exe");
        InstallRecord::new(&gone).save(dir.path()).unwrap();

        let inv = LocalInventory::new(dir.path().to_path_buf(), "exe", &reserved());
        assert_eq!(inv.current().unwrap().filename, "tracker_v1.0.exe");
    }
}
