//! Reloads triggered by edits from other processes.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use brcodes::CodesError;
use brcodes::watcher::FileWatcher;
use serde_json::json;
use tempfile::TempDir;

use crate::common::fixtures::{open_watched_store, wrapped, write_codes_file};
use crate::common::{init_test_logging, wait_until};

fn counting_callback(store: &brcodes::CodeStore) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    store.set_change_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    calls
}

#[tokio::test]
async fn test_external_edit_fires_callback_once() {
    init_test_logging();
    let temp = TempDir::new().unwrap();
    let store = open_watched_store(&temp).await;
    let calls = counting_callback(&store);

    write_codes_file(temp.path(), &wrapped(json!({ "tv": { "power": "P" } })));

    let fired = wait_until(Duration::from_secs(5), || calls.load(Ordering::SeqCst) > 0).await;
    assert!(fired, "callback not invoked after external edit");
    assert_eq!(store.get_command("tv", "power").unwrap(), Some(json!("P")));

    // Nothing else pending.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_own_save_notifies_with_saved_mapping() {
    init_test_logging();
    let temp = TempDir::new().unwrap();
    let store = open_watched_store(&temp).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store.set_change_callback(move |codes| {
        let commands = codes.get("tv").map_or(0, |c| c.len());
        sink.lock().unwrap().push(commands);
    });

    store.create_device("tv").unwrap();
    store.create_command("tv", "power", json!("P")).unwrap();
    store.create_command("tv", "mute", json!("M")).unwrap();
    store.flush().await.unwrap();

    let fired = wait_until(Duration::from_secs(5), || !seen.lock().unwrap().is_empty()).await;
    assert!(fired, "callback not invoked after own save");
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Every notification carries the in-memory mapping, never an older one.
    assert!(seen.lock().unwrap().iter().all(|&n| n == 2));
    assert_eq!(store.get_commands("tv").unwrap().len(), 2);
}

#[tokio::test]
async fn test_edit_after_own_save_is_applied() {
    let temp = TempDir::new().unwrap();
    let store = open_watched_store(&temp).await;
    let calls = counting_callback(&store);

    store.create_device("tv").unwrap();
    store.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let before = calls.load(Ordering::SeqCst);

    write_codes_file(temp.path(), &wrapped(json!({ "tv": {}, "ac": {} })));
    let fired = wait_until(Duration::from_secs(5), || calls.load(Ordering::SeqCst) > before).await;
    assert!(fired);
    assert_eq!(store.list_devices().unwrap(), vec!["tv", "ac"]);
}

#[tokio::test]
async fn test_stop_watching() {
    let temp = TempDir::new().unwrap();
    let store = open_watched_store(&temp).await;
    let calls = counting_callback(&store);
    store.stop_watching();

    write_codes_file(temp.path(), &wrapped(json!({ "tv": {} })));
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(store.list_devices().unwrap().is_empty());
}

#[tokio::test]
async fn test_watching_missing_directory_fails() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("missing").join("codes");
    let result = FileWatcher::with_callback(&path, Duration::from_millis(50), || {});
    assert!(matches!(result, Err(CodesError::WatchFailed { .. })));
}
