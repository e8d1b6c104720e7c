//! In-process entity registry.

use std::collections::BTreeMap;

use tracing::trace;

use super::{CommandButton, ControlledDevice, EntityRegistry};
use crate::error::Result;
use crate::naming::macs_match;

/// [`EntityRegistry`] that keeps everything in maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryEntityRegistry {
    devices: BTreeMap<String, ControlledDevice>,
    buttons: BTreeMap<String, CommandButton>,
    remotes: BTreeMap<String, String>,
}

impl MemoryEntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the remote entity that sends commands for `hub`.
    pub fn set_remote(&mut self, hub: &str, entity_id: &str) {
        self.remotes.insert(hub.to_string(), entity_id.to_string());
    }

    pub fn devices(&self) -> impl Iterator<Item = &ControlledDevice> {
        self.devices.values()
    }

    pub fn buttons(&self) -> impl Iterator<Item = &CommandButton> {
        self.buttons.values()
    }

    pub fn button(&self, unique_id: &str) -> Option<&CommandButton> {
        self.buttons.get(unique_id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn button_count(&self) -> usize {
        self.buttons.len()
    }
}

impl EntityRegistry for MemoryEntityRegistry {
    fn register_device(&mut self, device: &ControlledDevice) -> Result<()> {
        trace!(identifier = %device.identifier, "Registering device");
        self.devices.insert(device.identifier.clone(), device.clone());
        Ok(())
    }

    fn remove_device(&mut self, identifier: &str) -> Result<()> {
        trace!(identifier = %identifier, "Removing device");
        self.devices.remove(identifier);
        Ok(())
    }

    fn register_button(&mut self, button: &CommandButton) -> Result<()> {
        trace!(unique_id = %button.unique_id, "Registering button");
        self.buttons.insert(button.unique_id.clone(), button.clone());
        Ok(())
    }

    fn remove_button(&mut self, unique_id: &str) -> Result<()> {
        trace!(unique_id = %unique_id, "Removing button");
        self.buttons.remove(unique_id);
        Ok(())
    }

    fn remote_entity(&self, hub: &str) -> Option<String> {
        self.remotes
            .iter()
            .find(|(known, _)| macs_match(known, hub))
            .map(|(_, entity_id)| entity_id.clone())
    }
}
