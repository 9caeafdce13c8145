use std::path::{Path, PathBuf};

use tracing::trace;

use crate::util::get_default_db_path;

/// Storage configuration
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "get_default_db_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: get_default_db_path(),
        }
    }
}

/// Probe configuration
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ProbeConfig {
    /// Explicit path to the speedtest binary (otherwise `./speedtest`, then `PATH`)
    pub binary: Option<PathBuf>,
}

/// Daemon configuration file
///
/// The measurement schedule, server override and history limit are not part
/// of this file; they live in the store and can be changed at runtime.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub probe: ProbeConfig,
}

impl Config {
    /// Apply overrides (environment or command line); `None` keeps the current value
    pub fn with_overrides(mut self, db_path: Option<PathBuf>, binary: Option<PathBuf>) -> Self {
        if let Some(path) = db_path {
            self.storage.path = path;
        }
        if let Some(binary) = binary {
            self.probe.binary = Some(binary);
        }
        self
    }
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path.as_ref())?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
