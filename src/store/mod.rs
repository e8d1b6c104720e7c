//! Watched, file-backed store of remote-control codes for one hub.
//!
//! A [`CodeStore`] keeps the device → command → code mapping in memory.
//! Reads and mutations are synchronous. Every mutation that changes
//! something schedules a save on the store's single writer task and returns
//! immediately; [`CodeStore::flush`] waits for the file to catch up.
//!
//! When the backing file changes on disk, the watcher posts a trigger and
//! the store reloads on its own task. Reading back one of the store's own
//! recent writes is recognized by content fingerprint: nothing is installed
//! and the change callback sees the in-memory mapping. While a save is still
//! queued or retrying, disk content is never installed over memory.

mod document;
mod storage;
mod writer;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::SystemTime;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};

pub use document::{Codes, CodesDocument, Commands, SCHEMA_MINOR_VERSION, SCHEMA_VERSION};
pub use storage::JsonFileStorage;
pub use writer::SaveStatus;

use crate::config::Settings;
use crate::error::{CodesError, Result};
use crate::naming::{normalize_mac, store_key};
use crate::watcher::FileWatcher;

/// Subscriber invoked with the mapping after each successful load.
pub type ChangeCallback = Arc<dyn Fn(&Codes) + Send + Sync>;

type Fingerprint = [u8; 32];

/// Own writes remembered for echo suppression. A reload can read a file
/// written one or two saves ago when it races the writer.
const RECENT_WRITES: usize = 3;

/// Notifications published on [`CodeStore::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// State up to `generation` is on disk.
    Saved { generation: u64 },
    /// Every attempt to persist `generation` failed.
    SaveFailed { generation: u64, reason: String },
    /// The mapping was replaced from disk.
    Reloaded { devices: usize },
    /// The file could not be parsed; the previous mapping was kept.
    LoadFailed { reason: String },
}

/// What a watcher-triggered reload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// New content was installed and the callback invoked.
    Applied,
    /// The file holds the store's own last write.
    OwnWrite,
    /// The file parsed to the mapping already in memory.
    Unchanged,
    /// The file is gone; in-memory state kept.
    Missing,
    /// The file is not valid JSON; in-memory state kept.
    Corrupt,
    /// A save is queued or retrying; in-memory state kept and written next.
    SavePending,
}

/// Handle to one hub's code store. Cheap to clone.
#[derive(Clone)]
pub struct CodeStore {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    hub: String,
    key: String,
    storage: JsonFileStorage,
    settings: Settings,
    document: RwLock<Option<CodesDocument>>,
    last_modified: RwLock<Option<SystemTime>>,
    own_writes: Mutex<OwnWrites>,
    callback: RwLock<Option<ChangeCallback>>,
    events: broadcast::Sender<StoreEvent>,
    requests: watch::Sender<u64>,
    status: watch::Sender<SaveStatus>,
    watcher: Mutex<Option<FileWatcher>>,
}

impl CodeStore {
    /// Create an unloaded store for a hub and start its writer task.
    ///
    /// Read accessors fail with [`CodesError::NotLoaded`] until [`Self::load`]
    /// completes. Must be called from within a Tokio runtime.
    pub fn new(hub_address: &str, storage: JsonFileStorage, settings: Settings) -> Result<Self> {
        let hub = normalize_mac(hub_address)?;
        let key = store_key(&hub);
        let handle = Handle::try_current()
            .map_err(|e| CodesError::Other(format!("Code store needs a Tokio runtime: {e}")))?;

        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let (requests, requests_rx) = watch::channel(0);
        let (status, _) = watch::channel(SaveStatus::default());

        let shared = Arc::new(Shared {
            hub,
            key,
            storage,
            settings,
            document: RwLock::new(None),
            last_modified: RwLock::new(None),
            own_writes: Mutex::new(OwnWrites::default()),
            callback: RwLock::new(None),
            events,
            requests,
            status,
            watcher: Mutex::new(None),
        });
        handle.spawn(writer::run_writer(Arc::downgrade(&shared), requests_rx));

        debug!(key = %shared.key, path = %shared.path().display(), "Created code store");
        Ok(Self { shared })
    }

    /// Create, load, and (if enabled in settings) start watching a store.
    pub async fn open(
        hub_address: &str,
        storage: JsonFileStorage,
        settings: Settings,
    ) -> Result<Self> {
        let store = Self::new(hub_address, storage, settings)?;
        store.load().await?;
        if store.shared.settings.watch {
            store.start_watching().await?;
        }
        Ok(store)
    }

    /// Normalized hub address this store belongs to.
    pub fn hub(&self) -> &str {
        &self.shared.hub
    }

    /// Storage key of the backing file.
    pub fn key(&self) -> &str {
        &self.shared.key
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.shared.path()
    }

    /// True if both handles point at the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.read_document().is_some()
    }

    /// Modification time of the file at the last successful load or save.
    pub fn last_modified(&self) -> Option<SystemTime> {
        *self
            .shared
            .last_modified
            .read()
            .expect("last_modified lock poisoned")
    }

    // === Persistence ===

    /// Read the backing file into memory.
    ///
    /// A missing or unparseable file yields an empty mapping. Other I/O
    /// errors are returned and leave the current state untouched. On
    /// success the change callback runs with the loaded mapping.
    pub async fn load(&self) -> Result<()> {
        let shared = &self.shared;
        let document = match shared.storage.load(&shared.key).await? {
            None => {
                info!(key = %shared.key, "No codes file yet, starting empty");
                CodesDocument::empty(&shared.key)
            }
            Some(bytes) => match CodesDocument::from_slice(&bytes, &shared.key) {
                Ok(document) => document,
                Err(e) => {
                    warn!(key = %shared.key, error = %e, "Codes file is corrupt, starting empty");
                    shared.publish(StoreEvent::LoadFailed {
                        reason: e.to_string(),
                    });
                    CodesDocument::empty(&shared.key)
                }
            },
        };

        info!(key = %shared.key, devices = document.data.len(), "Loaded codes");
        shared.install(document).await;
        Ok(())
    }

    /// Reload after the file changed on disk.
    ///
    /// Unlike [`Self::load`], this never discards the current mapping: a
    /// missing or corrupt file is reported and skipped, nothing is installed
    /// while a save is pending, and content equal to one of the store's own
    /// recent writes or to the current mapping is not applied. Reading back an
    /// own write still runs the change callback with the in-memory mapping.
    pub async fn reload_from_disk(&self) -> Result<ReloadOutcome> {
        let shared = &self.shared;
        let Some(bytes) = shared.storage.load(&shared.key).await? else {
            debug!(key = %shared.key, "Codes file disappeared, keeping in-memory state");
            return Ok(ReloadOutcome::Missing);
        };

        if shared.save_pending() {
            debug!(key = %shared.key, "Save pending, not reloading over in-memory codes");
            return Ok(ReloadOutcome::SavePending);
        }

        let print = fingerprint(&bytes);
        let own_write = shared
            .own_writes
            .lock()
            .expect("fingerprint lock poisoned")
            .contains(&print);
        if own_write {
            trace!(key = %shared.key, fingerprint = %short_hex(&print), "Read back own write");
            shared.refresh_mtime().await;
            shared.notify_current();
            return Ok(ReloadOutcome::OwnWrite);
        }

        let document = match CodesDocument::from_slice(&bytes, &shared.key) {
            Ok(document) => document,
            Err(e) => {
                warn!(key = %shared.key, error = %e, "Changed codes file is corrupt, keeping previous codes");
                shared.publish(StoreEvent::LoadFailed {
                    reason: e.to_string(),
                });
                return Ok(ReloadOutcome::Corrupt);
            }
        };

        let unchanged = shared
            .read_document()
            .as_ref()
            .is_some_and(|current| current.data.iter().eq(document.data.iter()));
        if unchanged {
            debug!(key = %shared.key, "Codes file changed but content is identical");
            shared.refresh_mtime().await;
            return Ok(ReloadOutcome::Unchanged);
        }

        info!(key = %shared.key, devices = document.data.len(), "Reloaded codes after external change");
        shared.install(document).await;
        Ok(ReloadOutcome::Applied)
    }

    /// Schedule a save of the current state without waiting for it.
    pub fn save(&self) {
        self.shared.schedule_save();
    }

    /// Wait until every change made so far has been written.
    ///
    /// Returns the error of the last write if it failed after all retries.
    pub async fn flush(&self) -> Result<()> {
        let target = *self.shared.requests.borrow();
        let mut status = self.shared.status.subscribe();
        let status = status
            .wait_for(|s| s.generation >= target)
            .await
            .map(|s| s.clone())
            .map_err(|_| CodesError::Other("code store writer stopped".to_string()))?;

        match status.error {
            None => Ok(()),
            Some(reason) => Err(CodesError::Persistence {
                path: self.path(),
                reason,
            }),
        }
    }

    /// Begin reloading whenever the backing file changes.
    ///
    /// Creates the storage directory if needed. Calling it again is a no-op.
    pub async fn start_watching(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.watcher.lock().expect("watcher lock poisoned").is_some() {
            return Ok(());
        }

        let root = shared.storage.root().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| CodesError::persistence(&root, e))?;

        let (watcher, mut triggers) = FileWatcher::new(&shared.path(), shared.settings.debounce(), 1)?;
        debug!(key = %shared.key, path = %watcher.path().display(), "Reloading on file changes");
        let weak: Weak<Shared> = Arc::downgrade(shared);
        tokio::spawn(async move {
            while triggers.recv().await.is_some() {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let store = Self { shared };
                match store.reload_from_disk().await {
                    Ok(outcome) => trace!(key = %store.key(), ?outcome, "Handled file change"),
                    Err(e) => warn!(key = %store.key(), error = %e, "Reload after file change failed"),
                }
            }
        });

        *shared.watcher.lock().expect("watcher lock poisoned") = Some(watcher);
        Ok(())
    }

    /// Stop reloading on file changes.
    pub fn stop_watching(&self) {
        if self
            .shared
            .watcher
            .lock()
            .expect("watcher lock poisoned")
            .take()
            .is_some()
        {
            debug!(key = %self.key(), "Stopped watching codes file");
        }
    }

    // === Notifications ===

    /// Register the subscriber run after each successful load, replacing any previous one.
    pub fn set_change_callback<F>(&self, callback: F)
    where
        F: Fn(&Codes) + Send + Sync + 'static,
    {
        *self.shared.callback.write().expect("callback lock poisoned") = Some(Arc::new(callback));
    }

    pub fn clear_change_callback(&self) {
        *self.shared.callback.write().expect("callback lock poisoned") = None;
    }

    /// Stream of save/load events, the channel for persistence failures.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.shared.events.subscribe()
    }

    // === Reads ===

    /// All device names, in insertion order.
    pub fn list_devices(&self) -> Result<Vec<String>> {
        self.read(|codes| codes.keys().cloned().collect())
    }

    /// Commands of a device; empty if the device is absent.
    pub fn get_commands(&self, device: &str) -> Result<Commands> {
        self.read(|codes| codes.get(device).cloned().unwrap_or_default())
    }

    /// Value of a single command.
    pub fn get_command(&self, device: &str, command: &str) -> Result<Option<Value>> {
        self.read(|codes| codes.get(device).and_then(|c| c.get(command)).cloned())
    }

    pub fn device_exists(&self, device: &str) -> Result<bool> {
        self.read(|codes| codes.contains_key(device))
    }

    pub fn command_exists(&self, device: &str, command: &str) -> Result<bool> {
        self.read(|codes| codes.get(device).is_some_and(|c| c.contains_key(command)))
    }

    /// Copy of the whole mapping.
    pub fn snapshot(&self) -> Result<Codes> {
        self.read(Clone::clone)
    }

    // === Mutations ===
    //
    // Each returns whether anything changed. Missing targets are no-ops.

    pub fn create_device(&self, device: &str) -> Result<bool> {
        self.mutate(|codes| {
            if codes.contains_key(device) {
                return false;
            }
            codes.insert(device.to_string(), Commands::new());
            true
        })
    }

    pub fn delete_device(&self, device: &str) -> Result<bool> {
        self.mutate(|codes| codes.shift_remove(device).is_some())
    }

    /// Move a device's commands to `new`. An existing `new` device is overwritten.
    pub fn rename_device(&self, old: &str, new: &str) -> Result<bool> {
        self.mutate(|codes| match codes.shift_remove(old) {
            Some(commands) => {
                codes.insert(new.to_string(), commands);
                true
            }
            None => false,
        })
    }

    pub fn create_command(&self, device: &str, command: &str, value: Value) -> Result<bool> {
        self.update_command_value(device, command, value)
    }

    /// Set a command's value, creating the command if needed. No-op if the device is absent.
    pub fn update_command_value(&self, device: &str, command: &str, value: Value) -> Result<bool> {
        self.mutate(|codes| match codes.get_mut(device) {
            Some(commands) => {
                commands.insert(command.to_string(), value);
                true
            }
            None => false,
        })
    }

    pub fn delete_command(&self, device: &str, command: &str) -> Result<bool> {
        self.mutate(|codes| {
            codes
                .get_mut(device)
                .is_some_and(|commands| commands.shift_remove(command).is_some())
        })
    }

    /// Move a command's value to `new`. An existing `new` command is overwritten.
    pub fn rename_command(&self, device: &str, old: &str, new: &str) -> Result<bool> {
        self.mutate(|codes| {
            let Some(commands) = codes.get_mut(device) else {
                return false;
            };
            match commands.shift_remove(old) {
                Some(value) => {
                    commands.insert(new.to_string(), value);
                    true
                }
                None => false,
            }
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Codes) -> T) -> Result<T> {
        let guard = self.shared.read_document();
        let document = guard.as_ref().ok_or_else(|| self.not_loaded())?;
        Ok(f(&document.data))
    }

    fn mutate(&self, f: impl FnOnce(&mut Codes) -> bool) -> Result<bool> {
        let changed = {
            let mut guard = self.shared.write_document();
            let document = guard.as_mut().ok_or_else(|| self.not_loaded())?;
            f(&mut document.data)
        };
        if changed {
            self.shared.schedule_save();
        }
        Ok(changed)
    }

    fn not_loaded(&self) -> CodesError {
        CodesError::NotLoaded {
            key: self.shared.key.clone(),
        }
    }
}

impl std::fmt::Debug for CodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeStore")
            .field("key", &self.shared.key)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn path(&self) -> PathBuf {
        self.storage.path_for(&self.key)
    }

    fn read_document(&self) -> RwLockReadGuard<'_, Option<CodesDocument>> {
        self.document.read().expect("codes lock poisoned")
    }

    fn write_document(&self) -> RwLockWriteGuard<'_, Option<CodesDocument>> {
        self.document.write().expect("codes lock poisoned")
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn schedule_save(&self) {
        self.requests.send_modify(|generation| *generation += 1);
    }

    /// True while a requested save has not finished, successfully or not.
    fn save_pending(&self) -> bool {
        *self.requests.borrow() > self.status.borrow().generation
    }

    async fn refresh_mtime(&self) {
        let mtime = self.storage.modified(&self.key).await;
        *self.last_modified.write().expect("last_modified lock poisoned") = mtime;
    }

    /// Replace the mapping, record the mtime, and notify.
    async fn install(&self, document: CodesDocument) {
        let snapshot = document.data.clone();
        *self.write_document() = Some(document);
        self.refresh_mtime().await;

        self.publish(StoreEvent::Reloaded {
            devices: snapshot.len(),
        });
        self.run_callback(&snapshot);
    }

    /// Run the change callback with the mapping already in memory.
    fn notify_current(&self) {
        let snapshot = match self.read_document().as_ref() {
            Some(document) => document.data.clone(),
            None => return,
        };
        self.run_callback(&snapshot);
    }

    fn run_callback(&self, codes: &Codes) {
        // Cloned out so the callback runs without the lock held.
        let callback = self.callback.read().expect("callback lock poisoned").clone();
        if let Some(callback) = callback {
            callback(codes);
        }
    }

    /// Serialize the current document and write it once.
    async fn write_once(&self) -> Result<()> {
        let bytes = {
            let guard = self.read_document();
            let Some(document) = guard.as_ref() else {
                return Ok(());
            };
            document.to_bytes()?
        };

        // Recorded before the write so an early watcher event is still recognized.
        let print = fingerprint(&bytes);
        self.own_writes
            .lock()
            .expect("fingerprint lock poisoned")
            .begin(print);
        trace!(key = %self.key, fingerprint = %short_hex(&print), "Writing codes");

        match self.storage.save(&self.key, &bytes).await {
            Ok(mtime) => {
                *self.last_modified.write().expect("last_modified lock poisoned") = mtime;
                Ok(())
            }
            Err(e) => {
                // The rename never happened, so this content is not on disk.
                self.own_writes
                    .lock()
                    .expect("fingerprint lock poisoned")
                    .abort(&print);
                Err(e)
            }
        }
    }
}

/// Fingerprints of recent writes, oldest first.
#[derive(Debug, Default)]
struct OwnWrites {
    recent: VecDeque<Fingerprint>,
}

impl OwnWrites {
    fn begin(&mut self, print: Fingerprint) {
        self.recent.retain(|p| p != &print);
        self.recent.push_back(print);
        while self.recent.len() > RECENT_WRITES {
            self.recent.pop_front();
        }
    }

    fn abort(&mut self, print: &Fingerprint) {
        if self.recent.back() == Some(print) {
            self.recent.pop_back();
        }
    }

    fn contains(&self, print: &Fingerprint) -> bool {
        self.recent.contains(print)
    }
}

fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Sha256::digest(bytes).into()
}

fn short_hex(print: &Fingerprint) -> String {
    hex::encode(&print[..6])
}
