//! Runtime settings for code stores.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::path::{default_config_path, default_storage_dir, resolve_path};
use crate::error::{CodesError, Result};

/// Tunables shared by every store a registry creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding one codes file per hub.
    pub storage_dir: PathBuf,
    /// Window in which repeated modify events for the same file collapse into one reload.
    pub debounce_ms: u64,
    /// Extra attempts after a failed save before it is reported.
    pub save_retries: u32,
    /// Initial delay between save attempts; doubles on each retry.
    pub retry_backoff_ms: u64,
    /// Capacity of the store event broadcast channel.
    pub event_capacity: usize,
    /// Start a file watcher when a store is opened.
    pub watch: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            debounce_ms: 250,
            save_retries: 3,
            retry_backoff_ms: 100,
            event_capacity: 32,
            watch: true,
        }
    }
}

impl Settings {
    /// Settings rooted at a specific storage directory, defaults elsewhere.
    pub fn with_storage_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: dir.into(),
            ..Self::default()
        }
    }

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Parse settings from TOML text. Relative `storage_dir` resolves against `base_dir`.
    pub fn from_toml(text: &str, base_dir: &Path) -> Result<Self> {
        let mut settings: Self = toml::from_str(text)
            .map_err(|e| CodesError::Config(format!("Invalid settings: {e}")))?;
        settings.storage_dir = resolve_path(&settings.storage_dir, base_dir)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CodesError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let settings = Self::from_toml(&text, base_dir)?;
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Resolve settings: explicit file, then the per-user default file, then defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => {
                debug!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(CodesError::Config(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
