use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CryptvolError, Result};

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "CRYPTVOL_CONFIG";

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// External tool locations
    pub tools: ToolPaths,

    /// Per-command timeout in seconds (0 = unlimited)
    pub command_timeout_secs: u64,

    /// Directory for temporary key files (defaults to the system temp dir)
    pub key_dir: Option<PathBuf>,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            command_timeout_secs: 300,
            key_dir: None,
            log_level: LogLevel::Warn,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            CryptvolError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: RuntimeConfig = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    /// Load from `$CRYPTVOL_CONFIG` if set, otherwise defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(PathBuf::from(path)),
            _ => Ok(Self::default()),
        }
    }

    /// Command timeout, `None` when disabled.
    pub fn command_timeout(&self) -> Option<Duration> {
        match self.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Directory for temporary key files.
    pub fn key_dir(&self) -> PathBuf {
        self.key_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// External tool locations. Bare names are resolved through `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Sparse file creation (`truncate -s <size> <path>`)
    pub truncate: PathBuf,

    /// Loop device control (`losetup -j|-f <path>`)
    pub losetup: PathBuf,

    /// LUKS management
    pub cryptsetup: PathBuf,

    /// ext4 filesystem creation
    pub mkfs_ext4: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            truncate: PathBuf::from("truncate"),
            losetup: PathBuf::from("losetup"),
            cryptsetup: PathBuf::from("cryptsetup"),
            mkfs_ext4: PathBuf::from("mkfs.ext4"),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
