//! Host entities derived from a hub's codes.
//!
//! Every device in a store becomes a controlled device, and every command
//! becomes a pressable button attached to it. This module only describes
//! those entities and works out what changed between two mappings; the
//! host's registries sit behind the [`EntityRegistry`] trait.

mod memory;
mod sync;

pub use memory::MemoryEntityRegistry;
pub use sync::EntitySync;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{CodesError, Result};
use crate::naming::{button_unique_id, device_identifier};
use crate::store::Codes;

pub const CONTROLLED_MANUFACTURER: &str = "Broadlink-Controlled";
pub const SEND_COMMAND_SERVICE: &str = "remote.send_command";

/// A device controlled through a hub (TV, air conditioner, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlledDevice {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: String,
    pub via_hub: String,
}

impl ControlledDevice {
    pub fn new(hub: &str, device: &str) -> Self {
        Self {
            identifier: device_identifier(hub, device),
            name: device.to_string(),
            manufacturer: CONTROLLED_MANUFACTURER,
            model: device.to_string(),
            via_hub: hub.to_string(),
        }
    }
}

/// A button that sends one stored command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandButton {
    pub unique_id: String,
    pub name: String,
    pub hub: String,
    pub device: String,
    pub command: String,
    pub device_identifier: String,
}

impl CommandButton {
    pub fn new(hub: &str, device: &str, command: &str) -> Self {
        Self {
            unique_id: button_unique_id(hub, device, command),
            name: format!("{device} {command} Button"),
            hub: hub.to_string(),
            device: device.to_string(),
            command: command.to_string(),
            device_identifier: device_identifier(hub, device),
        }
    }

    /// Service call that presses this button through `remote_entity_id`.
    pub fn send_command(&self, remote_entity_id: impl Into<String>) -> SendCommand {
        SendCommand {
            entity_id: remote_entity_id.into(),
            device: self.device.clone(),
            command: self.command.clone(),
        }
    }
}

/// Service data for the host's `remote.send_command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendCommand {
    pub entity_id: String,
    pub device: String,
    pub command: String,
}

/// Host registries that entities are registered with.
///
/// Implemented by the host integration; [`MemoryEntityRegistry`] is an
/// in-process version for tests and the CLI.
pub trait EntityRegistry {
    /// Register (or refresh) a controlled device.
    fn register_device(&mut self, device: &ControlledDevice) -> Result<()>;

    /// Remove a controlled device by identifier. Removing an unknown device is not an error.
    fn remove_device(&mut self, identifier: &str) -> Result<()>;

    /// Register (or refresh) a button entity.
    fn register_button(&mut self, button: &CommandButton) -> Result<()>;

    /// Remove a button entity by unique id. Removing an unknown button is not an error.
    fn remove_button(&mut self, unique_id: &str) -> Result<()>;

    /// Entity id of the hub's remote entity, used to send commands.
    fn remote_entity(&self, hub: &str) -> Option<String>;
}

/// Resolve a button press into the service call the host should make.
pub fn press<R: EntityRegistry + ?Sized>(button: &CommandButton, registry: &R) -> Result<SendCommand> {
    let remote = registry
        .remote_entity(&button.hub)
        .ok_or_else(|| CodesError::RemoteNotFound {
            hub: button.hub.clone(),
        })?;
    Ok(button.send_command(remote))
}

/// Buttons for every command of every device, in store order.
pub fn buttons_for(hub: &str, codes: &Codes) -> Vec<CommandButton> {
    codes
        .iter()
        .flat_map(|(device, commands)| {
            commands
                .keys()
                .map(move |command| CommandButton::new(hub, device, command))
        })
        .collect()
}

/// Controlled devices for every device in the store.
pub fn devices_for(hub: &str, codes: &Codes) -> Vec<ControlledDevice> {
    codes
        .keys()
        .map(|device| ControlledDevice::new(hub, device))
        .collect()
}

/// Entities to add and remove to go from one mapping to another.
///
/// Identity is the unique id, so a command whose value changed is neither
/// added nor removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityDiff {
    pub added_devices: Vec<ControlledDevice>,
    pub removed_devices: Vec<String>,
    pub added_buttons: Vec<CommandButton>,
    pub removed_buttons: Vec<String>,
}

impl EntityDiff {
    pub fn between(hub: &str, old: &Codes, new: &Codes) -> Self {
        let old_devices = by_id(devices_for(hub, old), |d| d.identifier.clone());
        let new_devices = by_id(devices_for(hub, new), |d| d.identifier.clone());
        let old_buttons = by_id(buttons_for(hub, old), |b| b.unique_id.clone());
        let new_buttons = by_id(buttons_for(hub, new), |b| b.unique_id.clone());

        Self {
            added_devices: new_devices
                .iter()
                .filter(|(id, _)| !old_devices.contains_key(*id))
                .map(|(_, d)| d.clone())
                .collect(),
            removed_devices: old_devices
                .keys()
                .filter(|id| !new_devices.contains_key(*id))
                .cloned()
                .collect(),
            added_buttons: new_buttons
                .iter()
                .filter(|(id, _)| !old_buttons.contains_key(*id))
                .map(|(_, b)| b.clone())
                .collect(),
            removed_buttons: old_buttons
                .keys()
                .filter(|id| !new_buttons.contains_key(*id))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_devices.is_empty()
            && self.removed_devices.is_empty()
            && self.added_buttons.is_empty()
            && self.removed_buttons.is_empty()
    }
}

fn by_id<T>(items: Vec<T>, id: impl Fn(&T) -> String) -> BTreeMap<String, T> {
    items.into_iter().map(|item| (id(&item), item)).collect()
}
