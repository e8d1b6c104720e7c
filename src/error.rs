//! Error types for code store operations.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for code store operations.
#[derive(Error, Debug)]
pub enum CodesError {
    // Store state errors
    #[error("Code store '{key}' accessed before its first load")]
    NotLoaded { key: String },

    #[error("Persistence failure for {}: {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },

    // Input errors
    #[error("Invalid hub address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("'{name}' already exists{}", collision_scope(.scope))]
    NameCollision { name: String, scope: Option<String> },

    #[error("Device not found: {name}")]
    DeviceNotFound { name: String },

    #[error("Command not found: {device}/{command}")]
    CommandNotFound { device: String, command: String },

    #[error("No remote entity registered for hub {hub}")]
    RemoteNotFound { hub: String },

    // Watcher errors
    #[error("Failed to watch {}: {reason}", .path.display())]
    WatchFailed { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl CodesError {
    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. }
                | Self::NameCollision { .. }
                | Self::DeviceNotFound { .. }
                | Self::CommandNotFound { .. }
                | Self::Config(_)
        )
    }

    /// Returns true if retrying the same operation may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::Io(_))
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidAddress { .. } => {
                Some("Pass the hub MAC as 12 hex digits, e.g. --hub aa:bb:cc:dd:ee:ff")
            }
            Self::NameCollision { .. } => Some("Pick another name or pass --force to overwrite"),
            Self::DeviceNotFound { .. } => Some("Run: brcodes devices"),
            Self::CommandNotFound { .. } => Some("Run: brcodes commands <DEVICE>"),
            Self::WatchFailed { .. } => Some("Check that the storage directory exists"),
            Self::RemoteNotFound { .. } => Some("Set up the Broadlink hub's remote entity first"),
            _ => None,
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<notify::Error> for CodesError {
    fn from(err: notify::Error) -> Self {
        Self::WatchFailed {
            path: err.paths.first().cloned().unwrap_or_default(),
            reason: err.to_string(),
        }
    }
}

fn collision_scope(scope: &Option<String>) -> String {
    scope
        .as_ref()
        .map(|device| format!(" on device '{device}'"))
        .unwrap_or_default()
}

/// Convenience type alias for Results using CodesError.
pub type Result<T> = std::result::Result<T, CodesError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| CodesError::Other(format!("{}: {e}", f().into())))
    }
}
