//! Keeps a host registry in step with a code store.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::{EntityDiff, EntityRegistry};
use crate::error::Result;
use crate::store::{CodeStore, Codes};

struct SyncState<R> {
    registry: R,
    current: Codes,
}

/// Applies the entity diff of every new mapping to an [`EntityRegistry`].
///
/// Attach it to a store with [`EntitySync::attach`]; each reload then
/// removes stale buttons and devices and registers new ones instead of
/// tearing everything down.
pub struct EntitySync<R> {
    hub: String,
    state: Mutex<SyncState<R>>,
}

impl<R: EntityRegistry> EntitySync<R> {
    pub fn new(hub: impl Into<String>, registry: R) -> Self {
        Self {
            hub: hub.into(),
            state: Mutex::new(SyncState {
                registry,
                current: Codes::new(),
            }),
        }
    }

    /// Bring the registry in line with `codes` and return what changed.
    ///
    /// Registry errors are logged and skipped so one bad entity does not
    /// block the rest.
    pub fn apply(&self, codes: &Codes) -> EntityDiff {
        let mut state = self.lock();
        let diff = EntityDiff::between(&self.hub, &state.current, codes);
        if diff.is_empty() {
            debug!(hub = %self.hub, "Entities already up to date");
            state.current = codes.clone();
            return diff;
        }

        for unique_id in &diff.removed_buttons {
            log_failure(state.registry.remove_button(unique_id), "remove button", unique_id);
        }
        for identifier in &diff.removed_devices {
            log_failure(state.registry.remove_device(identifier), "remove device", identifier);
        }
        for device in &diff.added_devices {
            log_failure(
                state.registry.register_device(device),
                "register device",
                &device.identifier,
            );
        }
        for button in &diff.added_buttons {
            log_failure(
                state.registry.register_button(button),
                "register button",
                &button.unique_id,
            );
        }

        info!(
            hub = %self.hub,
            added = diff.added_buttons.len(),
            removed = diff.removed_buttons.len(),
            "Synchronized button entities"
        );
        state.current = codes.clone();
        diff
    }

    /// Run `f` against the wrapped registry.
    pub fn with_registry<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&self.lock().registry)
    }

    fn lock(&self) -> MutexGuard<'_, SyncState<R>> {
        self.state.lock().expect("entity sync lock poisoned")
    }
}

impl<R: EntityRegistry + Send + 'static> EntitySync<R> {
    /// Sync with the store's current mapping and on every later reload.
    ///
    /// Replaces any change callback already set on the store.
    pub fn attach(self: &Arc<Self>, store: &CodeStore) -> Result<EntityDiff> {
        let initial = self.apply(&store.snapshot()?);
        let sync = Arc::clone(self);
        store.set_change_callback(move |codes| {
            sync.apply(codes);
        });
        Ok(initial)
    }
}

fn log_failure(result: Result<()>, action: &str, id: &str) {
    if let Err(e) = result {
        warn!(id = %id, error = %e, "Failed to {action}");
    }
}
