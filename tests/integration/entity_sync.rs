//! Button entities following the stored codes.

use std::sync::Arc;
use std::time::Duration;

use brcodes::entities::{EntitySync, MemoryEntityRegistry, press};
use serde_json::json;
use tempfile::TempDir;

use crate::common::fixtures::{HUB_NORMALIZED, open_watched_store, wrapped, write_codes_file};
use crate::common::wait_until;

#[tokio::test]
async fn test_attach_registers_existing_codes() {
    let temp = TempDir::new().unwrap();
    write_codes_file(
        temp.path(),
        &wrapped(json!({ "tv": { "power": "P", "mute": "M" }, "fan": {} })),
    );
    let store = open_watched_store(&temp).await;
    let sync = Arc::new(EntitySync::new(store.hub(), MemoryEntityRegistry::new()));

    let diff = sync.attach(&store).unwrap();
    assert_eq!(diff.added_devices.len(), 2);
    assert_eq!(diff.added_buttons.len(), 2);

    let names: Vec<String> =
        sync.with_registry(|r| r.buttons().map(|b| b.name.clone()).collect());
    assert!(names.contains(&"tv power Button".to_string()));
    assert!(names.contains(&"tv mute Button".to_string()));
}

#[tokio::test]
async fn test_external_edit_updates_entities() {
    let temp = TempDir::new().unwrap();
    write_codes_file(temp.path(), &wrapped(json!({ "tv": { "power": "P", "mute": "M" } })));
    let store = open_watched_store(&temp).await;
    let sync = Arc::new(EntitySync::new(store.hub(), MemoryEntityRegistry::new()));
    sync.attach(&store).unwrap();

    write_codes_file(
        temp.path(),
        &wrapped(json!({ "tv": { "power": "P" }, "ac": { "cool": "C" } })),
    );

    let mute_id = format!("{HUB_NORMALIZED}_tv_mute");
    let cool_id = format!("{HUB_NORMALIZED}_ac_cool");
    let updated = wait_until(Duration::from_secs(5), || {
        sync.with_registry(|r| r.button(&mute_id).is_none() && r.button(&cool_id).is_some())
    })
    .await;
    assert!(updated, "entities did not follow the external edit");
    assert_eq!(sync.with_registry(MemoryEntityRegistry::device_count), 2);
}

#[tokio::test]
async fn test_local_edit_registers_buttons() {
    let temp = TempDir::new().unwrap();
    let store = open_watched_store(&temp).await;
    let sync = Arc::new(EntitySync::new(store.hub(), MemoryEntityRegistry::new()));
    sync.attach(&store).unwrap();

    store.create_device("tv").unwrap();
    store.create_command("tv", "power", json!("P")).unwrap();
    store.flush().await.unwrap();

    let registered = wait_until(Duration::from_secs(5), || {
        sync.with_registry(MemoryEntityRegistry::button_count) == 1
    })
    .await;
    assert!(registered, "button for a locally created command never registered");
    // Already in step with the store.
    assert!(sync.apply(&store.snapshot().unwrap()).is_empty());
}

#[tokio::test]
async fn test_press_sends_through_hub_remote() {
    let temp = TempDir::new().unwrap();
    write_codes_file(temp.path(), &wrapped(json!({ "tv": { "power": "P" } })));
    let store = open_watched_store(&temp).await;

    let mut registry = MemoryEntityRegistry::new();
    registry.set_remote(store.hub(), "remote.living_room_hub");
    let sync = Arc::new(EntitySync::new(store.hub(), registry));
    sync.attach(&store).unwrap();

    let call = sync.with_registry(|r| {
        let button = r.button(&format!("{HUB_NORMALIZED}_tv_power")).unwrap().clone();
        press(&button, r).unwrap()
    });
    assert_eq!(call.entity_id, "remote.living_room_hub");
    assert_eq!(call.device, "tv");
    assert_eq!(call.command, "power");
}
