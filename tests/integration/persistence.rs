//! File layout, legacy migration, and reload behaviour.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use brcodes::{CodeStore, JsonFileStorage, ReloadOutcome, Settings};
use serde_json::json;
use tempfile::TempDir;

use crate::common::fixtures::{
    HUB, STORE_FILE, open_store, read_codes_file, store_path, test_settings, wrapped,
    write_codes_file,
};

#[tokio::test]
async fn test_saved_file_layout() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    store.create_device("tv").unwrap();
    store.create_command("tv", "power", json!("JgA")).unwrap();
    store.flush().await.unwrap();

    let file = read_codes_file(temp.path());
    assert_eq!(file["version"], json!(1));
    assert_eq!(file["minor_version"], json!(1));
    assert_eq!(file["key"], json!("broadlink_remote_aabbccddeeff_codes"));
    assert_eq!(file["data"], json!({ "tv": { "power": "JgA" } }));
    assert!(!temp.path().join("broadlink_remote_aabbccddeeff_codes.tmp").exists());
}

#[tokio::test]
async fn test_round_trip_through_new_store() {
    let temp = TempDir::new().unwrap();
    {
        let store = open_store(&temp).await;
        for device in ["tv", "ac", "fan"] {
            store.create_device(device).unwrap();
        }
        store.create_command("ac", "cool", json!("C")).unwrap();
        store.create_command("ac", "heat", json!("H")).unwrap();
        store.flush().await.unwrap();
    }

    let reopened = open_store(&temp).await;
    assert_eq!(reopened.list_devices().unwrap(), vec!["tv", "ac", "fan"]);
    assert_eq!(
        reopened.get_commands("ac").unwrap().keys().collect::<Vec<_>>(),
        vec!["cool", "heat"]
    );
}

#[tokio::test]
async fn test_legacy_flat_file_is_migrated() {
    let temp = TempDir::new().unwrap();
    write_codes_file(temp.path(), &json!({ "foo": { "bar": "X" } }));

    let store = open_store(&temp).await;
    assert_eq!(store.list_devices().unwrap(), vec!["foo"]);
    assert_eq!(store.get_command("foo", "bar").unwrap(), Some(json!("X")));

    // The next save writes the wrapped layout.
    store.create_command("foo", "baz", json!("Y")).unwrap();
    store.flush().await.unwrap();
    let file = read_codes_file(temp.path());
    assert_eq!(file["data"]["foo"], json!({ "bar": "X", "baz": "Y" }));
    assert_eq!(file["version"], json!(1));
}

#[tokio::test]
async fn test_missing_file_starts_empty() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    assert!(store.is_loaded());
    assert!(store.list_devices().unwrap().is_empty());
    assert!(!store_path(temp.path()).exists());
}

#[tokio::test]
async fn test_corrupt_file_starts_empty() {
    let temp = TempDir::new().unwrap();
    std::fs::write(store_path(temp.path()), "not json {").unwrap();

    let store = open_store(&temp).await;
    assert!(store.list_devices().unwrap().is_empty());
}

#[tokio::test]
async fn test_external_edit_applied_on_reload() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    store.create_device("tv").unwrap();
    store.flush().await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    store.set_change_callback(move |codes| {
        assert!(codes.contains_key("radio"));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    write_codes_file(temp.path(), &wrapped(json!({ "tv": {}, "radio": { "on": "R" } })));
    assert_eq!(store.reload_from_disk().await.unwrap(), ReloadOutcome::Applied);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.list_devices().unwrap(), vec!["tv", "radio"]);

    // Same content again is not a change.
    write_codes_file(temp.path(), &wrapped(json!({ "tv": {}, "radio": { "on": "R" } })));
    assert_eq!(store.reload_from_disk().await.unwrap(), ReloadOutcome::Unchanged);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deleted_file_keeps_state() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    store.create_device("tv").unwrap();
    store.flush().await.unwrap();

    std::fs::remove_file(store_path(temp.path())).unwrap();
    assert_eq!(store.reload_from_disk().await.unwrap(), ReloadOutcome::Missing);
    assert_eq!(store.list_devices().unwrap(), vec!["tv"]);
}

#[tokio::test]
async fn test_storage_dir_created_on_save() {
    let temp = TempDir::new().unwrap();
    let nested = temp.path().join("a").join("b");
    let store = CodeStore::open(HUB, JsonFileStorage::new(&nested), test_settings(&nested))
        .await
        .unwrap();
    store.create_device("tv").unwrap();
    store.flush().await.unwrap();

    assert!(store_path(&nested).is_file());
}

#[tokio::test]
async fn test_reload_during_save_retry_keeps_edit() {
    let temp = TempDir::new().unwrap();
    let settings = Settings {
        retry_backoff_ms: 300,
        save_retries: 3,
        ..test_settings(temp.path())
    };
    let store = CodeStore::open(HUB, JsonFileStorage::new(temp.path()), settings)
        .await
        .unwrap();
    store.create_device("tv").unwrap();
    store.flush().await.unwrap();

    // A directory where the temp file goes makes the next write fail and back off.
    let blocker = temp.path().join(format!("{STORE_FILE}.tmp"));
    std::fs::create_dir(&blocker).unwrap();
    store.create_device("radio").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = store.reload_from_disk().await.unwrap();
    assert_ne!(outcome, ReloadOutcome::Applied);
    assert_eq!(store.list_devices().unwrap(), vec!["tv", "radio"]);

    std::fs::remove_dir(&blocker).unwrap();
    store.flush().await.unwrap();
    assert_eq!(store.list_devices().unwrap(), vec!["tv", "radio"]);
    assert_eq!(read_codes_file(temp.path())["data"], json!({ "tv": {}, "radio": {} }));
}

#[tokio::test]
async fn test_external_edit_waits_for_pending_save() {
    let temp = TempDir::new().unwrap();
    let settings = Settings {
        retry_backoff_ms: 300,
        ..test_settings(temp.path())
    };
    let store = CodeStore::open(HUB, JsonFileStorage::new(temp.path()), settings)
        .await
        .unwrap();
    store.create_device("tv").unwrap();
    store.flush().await.unwrap();

    let blocker = temp.path().join(format!("{STORE_FILE}.tmp"));
    std::fs::create_dir(&blocker).unwrap();
    store.create_device("radio").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    write_codes_file(temp.path(), &wrapped(json!({ "other": {} })));
    assert_eq!(store.reload_from_disk().await.unwrap(), ReloadOutcome::SavePending);
    assert!(!store.device_exists("other").unwrap());

    std::fs::remove_dir(&blocker).unwrap();
    store.flush().await.unwrap();
}
