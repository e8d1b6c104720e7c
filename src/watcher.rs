//! Filesystem watcher for a single codes file.
//!
//! Watches the file's parent directory (non-recursive) through `notify`,
//! keeps only events for the exact target path, and collapses bursts into a
//! single trigger once the file has been quiet for the debounce window.
//! Triggers are delivered on a bounded Tokio channel so the owner performs
//! the reload on its own task instead of the OS notification thread.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{CodesError, Result};

/// Raw events buffered between the notify thread and the debounce task.
const RAW_EVENT_CAPACITY: usize = 64;

/// Active observation of one file. Dropping it stops the watch.
pub struct FileWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    debounce_task: JoinHandle<()>,
}

impl FileWatcher {
    /// Start watching `path`.
    ///
    /// The parent directory must already exist; a missing directory fails
    /// with [`CodesError::WatchFailed`] rather than waiting for it to appear.
    /// Must be called from within a Tokio runtime.
    pub fn new(
        path: &Path,
        debounce: Duration,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<()>)> {
        let (dir, target) = resolve_target(path)?;
        let handle = Handle::try_current().map_err(|e| CodesError::WatchFailed {
            path: target.clone(),
            reason: format!("no Tokio runtime: {e}"),
        })?;

        let (raw_tx, raw_rx) = mpsc::channel(RAW_EVENT_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(capacity.max(1));

        let filter_target = target.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_change(&event.kind) && event.paths.iter().any(|p| p == &filter_target) {
                        trace!(kind = ?event.kind, path = %filter_target.display(), "File event");
                        // A full buffer already holds a pending trigger.
                        let _ = raw_tx.try_send(());
                    }
                }
                Err(e) => warn!(error = %e, "File watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let debounce_task = handle.spawn(debounce_events(raw_rx, out_tx, debounce));
        debug!(
            path = %target.display(),
            debounce_ms = debounce.as_millis(),
            "Watching codes file"
        );

        Ok((
            Self {
                path: target,
                _watcher: watcher,
                debounce_task,
            },
            out_rx,
        ))
    }

    /// Start watching `path` and invoke `on_change` for every trigger.
    pub fn with_callback<F>(path: &Path, debounce: Duration, on_change: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (watcher, mut rx) = Self::new(path, debounce, 1)?;
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                on_change();
            }
        });
        Ok(watcher)
    }

    /// Canonical path of the watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.debounce_task.abort();
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").field("path", &self.path).finish()
    }
}

fn resolve_target(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let watch_failed = |reason: String| CodesError::WatchFailed {
        path: path.to_path_buf(),
        reason,
    };

    let file_name = path
        .file_name()
        .ok_or_else(|| watch_failed("path has no file name".to_string()))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = parent
        .canonicalize()
        .map_err(|e| watch_failed(format!("directory {} is not accessible: {e}", parent.display())))?;
    if !dir.is_dir() {
        return Err(watch_failed(format!("{} is not a directory", dir.display())));
    }

    let target = dir.join(file_name);
    Ok((dir, target))
}

const fn is_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

/// Forward one trigger per burst, after the file has been quiet for `window`.
async fn debounce_events(
    mut raw: mpsc::Receiver<()>,
    out: mpsc::Sender<()>,
    window: Duration,
) {
    while raw.recv().await.is_some() {
        loop {
            match timeout(window, raw.recv()).await {
                Ok(Some(())) => {}
                Ok(None) => return,
                Err(_) => break,
            }
        }

        match out.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => return,
        }
    }
}
