//! Registry of open code stores, one per hub.
//!
//! The registry is an explicit object owned by the integration layer and
//! passed to whatever needs a store. Concurrent `get_or_create` calls for the
//! same new hub share a single construction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::Settings;
use crate::error::Result;
use crate::naming::normalize_mac;
use crate::store::{CodeStore, JsonFileStorage};

/// Opens and caches [`CodeStore`]s by normalized hub address.
#[derive(Debug)]
pub struct StoreRegistry {
    storage: JsonFileStorage,
    settings: Settings,
    stores: Mutex<HashMap<String, Arc<OnceCell<CodeStore>>>>,
}

impl StoreRegistry {
    pub fn new(settings: Settings) -> Self {
        Self {
            storage: JsonFileStorage::new(&settings.storage_dir),
            settings,
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Store for `hub_address`, opening and loading it on first use.
    ///
    /// A failed open leaves nothing cached, so the next call tries again.
    pub async fn get_or_create(&self, hub_address: &str) -> Result<CodeStore> {
        let hub = normalize_mac(hub_address)?;
        let cell = {
            let mut stores = self.stores.lock().expect("registry lock poisoned");
            Arc::clone(stores.entry(hub.clone()).or_default())
        };

        let store = cell
            .get_or_try_init(|| async {
                debug!(hub = %hub, "Opening code store");
                CodeStore::open(&hub, self.storage.clone(), self.settings.clone()).await
            })
            .await?;
        Ok(store.clone())
    }

    /// Store for `hub_address` if one is already open.
    pub fn get(&self, hub_address: &str) -> Option<CodeStore> {
        let hub = normalize_mac(hub_address).ok()?;
        self.stores
            .lock()
            .expect("registry lock poisoned")
            .get(&hub)
            .and_then(|cell| cell.get().cloned())
    }

    /// Normalized addresses of every open store.
    pub fn addresses(&self) -> Vec<String> {
        let stores = self.stores.lock().expect("registry lock poisoned");
        let mut addresses: Vec<String> = stores
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(hub, _)| hub.clone())
            .collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.addresses().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
