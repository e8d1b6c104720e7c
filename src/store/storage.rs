//! Key-addressed file persistence.
//!
//! One file per key under a root directory, replaced atomically on save.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tracing::{debug, trace};

use crate::error::{CodesError, Result};

/// Storage directory holding one file per key.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Read the raw contents for `key`. `Ok(None)` when the file does not exist.
    pub async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(path = %path.display(), bytes = bytes.len(), "Read codes file");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Codes file does not exist yet");
                Ok(None)
            }
            Err(e) => Err(CodesError::persistence(path, e)),
        }
    }

    /// Replace the contents for `key` and return the new modification time.
    ///
    /// Writes a sibling temp file and renames it over the target.
    pub async fn save(&self, key: &str, bytes: &[u8]) -> Result<Option<SystemTime>> {
        let path = self.path_for(key);
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CodesError::persistence(&self.root, e))?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| CodesError::persistence(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CodesError::persistence(&path, e));
        }

        trace!(path = %path.display(), bytes = bytes.len(), "Wrote codes file");
        Ok(self.modified(key).await)
    }

    /// Modification time of the file for `key`, if it exists.
    pub async fn modified(&self, key: &str) -> Option<SystemTime> {
        fs::metadata(self.path_for(key))
            .await
            .and_then(|meta| meta.modified())
            .ok()
    }
}
