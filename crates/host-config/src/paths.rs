//! File system paths for the widget host.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;

/// Manages file system paths for the widget host.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.widget-host)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.widget-host`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".widget-host"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.widget-host/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (~/.widget-host/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.widget-host/logs/widget-host.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("widget-host.jsonl")
    }

    /// Create the base directory if it does not exist.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}
