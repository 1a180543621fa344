//! Configuration management for wardend.
//!
//! Loads settings from /etc/warden/config.toml or uses defaults. Every
//! field has a default so a missing or partial file still yields a
//! runnable agent.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/warden/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/warden/config.toml";

/// Remote authority endpoints and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Version oracle endpoint
    #[serde(default = "default_version_url")]
    pub version_url: String,

    /// Artifact download endpoint (serves whatever the authority
    /// currently considers latest; no filename parameter)
    #[serde(default = "default_download_url")]
    pub download_url: String,

    /// Oracle request timeout in seconds
    #[serde(default = "default_oracle_timeout")]
    pub oracle_timeout_secs: u64,

    /// Download timeout in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

fn default_version_url() -> String {
    "http://127.0.0.1:5000/version".to_string()
}

fn default_download_url() -> String {
    "http://127.0.0.1:5000/download".to_string()
}

fn default_oracle_timeout() -> u64 {
    10
}

fn default_download_timeout() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            version_url: default_version_url(),
            download_url: default_download_url(),
            oracle_timeout_secs: default_oracle_timeout(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

/// Managed artifact identification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Directory holding the managed artifact. Defaults to the agent
    /// executable's own directory when unset.
    #[serde(default)]
    pub managed_dir: Option<PathBuf>,

    /// Extension artifacts are filtered by during directory scans
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Case-insensitive substring identifying the managed process in
    /// the OS process table
    #[serde(default = "default_process_match")]
    pub process_match: String,

    /// Filenames never treated as the managed artifact (the agent's own
    /// executable and service-wrapper variants)
    #[serde(default = "default_reserved")]
    pub reserved_filenames: Vec<String>,
}

fn default_extension() -> String {
    "exe".to_string()
}

fn default_process_match() -> String {
    "tracker".to_string()
}

fn default_reserved() -> Vec<String> {
    vec![
        "wardend".to_string(),
        "wardend.exe".to_string(),
        "wardend_service.exe".to_string(),
    ]
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            managed_dir: None,
            extension: default_extension(),
            process_match: default_process_match(),
            reserved_filenames: default_reserved(),
        }
    }
}

/// Periodic task timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Liveness check period in seconds
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,

    /// Update check period in seconds
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Grace period after a kill sweep before deleting the old artifact
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,

    /// Settle delay between a completed download and the start attempt
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

fn default_liveness_interval() -> u64 {
    10
}

fn default_update_interval() -> u64 {
    30
}

fn default_kill_grace() -> u64 {
    3
}

fn default_settle_delay() -> u64 {
    2
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            liveness_interval_secs: default_liveness_interval(),
            update_interval_secs: default_update_interval(),
            kill_grace_secs: default_kill_grace(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

/// Full agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub artifact: ArtifactConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load config from the standard locations, or return defaults.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(CONFIG_PATH))
            .or_else(|_| Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH)))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            })
    }

    /// Load config from a specific path (--config override).
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolve the managed directory: configured path, else the agent
    /// executable's directory, else the current working directory.
    pub fn managed_dir(&self) -> PathBuf {
        if let Some(dir) = &self.artifact.managed_dir {
            return dir.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// True when `filename` must never be treated as the managed
    /// artifact. Comparison is case-insensitive, matching the scan.
    pub fn is_reserved(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.artifact
            .reserved_filenames
            .iter()
            .any(|r| r.to_lowercase() == lower)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.liveness_interval_secs)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.update_interval_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.schedule.kill_grace_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.schedule.settle_delay_secs)
    }
}
