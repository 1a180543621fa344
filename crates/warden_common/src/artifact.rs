//! Artifact naming convention.
//!
//! Managed artifacts follow `<prefix>_v<major>.<minor>.<ext>`
//! (case-insensitive), e.g. `tracker_v1.5.exe`. Anything that does not
//! match parses to version 0.0. Update decisions compare filenames, not
//! version numbers; the version is carried for reporting.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // Compiled once; the pattern is a literal so this cannot fail.
    Regex::new(r"(?i)^(.+)_v(\d+)\.(\d+)\.([a-z0-9]+)$").unwrap()
});

/// Parsed `<major>.<minor>` pair from an artifact filename.
///
/// Kept as a pair rather than a float so that formatting recovers the
/// original digits (`tracker_v1.50.exe` stays "1.50", not "1.5").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub major: u32,
    pub minor: u32,
}

impl ArtifactVersion {
    /// Version of an unparsable filename.
    pub const ZERO: ArtifactVersion = ArtifactVersion { major: 0, minor: 0 };

    /// Numeric form matching the oracle's `version` field.
    pub fn as_f64(&self) -> f64 {
        format!("{}.{}", self.major, self.minor)
            .parse()
            .unwrap_or(0.0)
    }
}

impl fmt::Display for ArtifactVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A concrete artifact as named on disk or advertised by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactIdentity {
    pub filename: String,
    pub version: ArtifactVersion,
}

impl ArtifactIdentity {
    /// Build an identity from a filename, parsing its version.
    pub fn from_filename(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let version = parse_version(&filename);
        Self { filename, version }
    }

    /// Update-decision equality: exact filename string match.
    pub fn same_artifact(&self, other_filename: &str) -> bool {
        self.filename == other_filename
    }
}

/// Parse the version encoded in an artifact filename.
///
/// Non-matching filenames yield 0.0 rather than an error; the caller
/// treats such files as version-less but still present.
pub fn parse_version(filename: &str) -> ArtifactVersion {
    match VERSION_PATTERN.captures(filename) {
        Some(caps) => {
            let major = caps[2].parse().unwrap_or(0);
            let minor = caps[3].parse().unwrap_or(0);
            ArtifactVersion { major, minor }
        }
        None => ArtifactVersion::ZERO,
    }
}

/// Whether a filename follows the artifact naming convention at all.
pub fn matches_pattern(filename: &str) -> bool {
    VERSION_PATTERN.is_match(filename)
}
