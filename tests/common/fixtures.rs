//! Storage fixtures: temp directories, settings, and hand-written codes files.

use std::path::{Path, PathBuf};

use brcodes::{CodeStore, JsonFileStorage, Settings};
use serde_json::Value;
use tempfile::TempDir;

pub const HUB: &str = "AA:BB:CC:DD:EE:FF";
pub const HUB_NORMALIZED: &str = "aabbccddeeff";
pub const STORE_FILE: &str = "broadlink_remote_aabbccddeeff_codes";

/// Settings for tests: fast retries, short debounce, watching off.
pub fn test_settings(dir: &Path) -> Settings {
    Settings {
        debounce_ms: 100,
        retry_backoff_ms: 1,
        watch: false,
        ..Settings::with_storage_dir(dir)
    }
}

pub fn watching_settings(dir: &Path) -> Settings {
    Settings {
        watch: true,
        ..test_settings(dir)
    }
}

pub async fn open_store(temp: &TempDir) -> CodeStore {
    CodeStore::open(HUB, JsonFileStorage::new(temp.path()), test_settings(temp.path()))
        .await
        .expect("open store")
}

pub async fn open_watched_store(temp: &TempDir) -> CodeStore {
    CodeStore::open(
        HUB,
        JsonFileStorage::new(temp.path()),
        watching_settings(temp.path()),
    )
    .await
    .expect("open watched store")
}

pub fn store_path(dir: &Path) -> PathBuf {
    dir.join(STORE_FILE)
}

/// Write a codes file the way another process would.
pub fn write_codes_file(dir: &Path, contents: &Value) {
    let text = serde_json::to_string_pretty(contents).expect("serialize fixture");
    std::fs::write(store_path(dir), text).expect("write fixture");
}

/// Wrap a device mapping in the versioned envelope.
pub fn wrapped(data: Value) -> Value {
    serde_json::json!({
        "version": 1,
        "minor_version": 1,
        "key": STORE_FILE,
        "data": data,
    })
}

pub fn read_codes_file(dir: &Path) -> Value {
    let text = std::fs::read_to_string(store_path(dir)).expect("read codes file");
    serde_json::from_str(&text).expect("codes file is JSON")
}
