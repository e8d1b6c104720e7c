//! On-disk document format for a hub's codes file.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Commands of one device: command name to opaque code value.
pub type Commands = Map<String, Value>;

/// Every device of a hub: device name to its commands.
pub type Codes = IndexMap<String, Commands>;

pub const SCHEMA_VERSION: u32 = 1;
pub const SCHEMA_MINOR_VERSION: u32 = 1;

/// Versioned wrapper around the device mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodesDocument {
    pub version: u32,
    pub minor_version: u32,
    pub key: String,
    pub data: Codes,
}

impl CodesDocument {
    /// An empty document for a storage key.
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            minor_version: SCHEMA_MINOR_VERSION,
            key: key.into(),
            data: Codes::new(),
        }
    }

    /// Build a document from parsed JSON, migrating the legacy flat layout.
    ///
    /// A top level without a `data` key is the device mapping itself and is
    /// wrapped under `data`. Device entries that are not objects are dropped.
    pub fn from_value(value: Value, key: &str) -> Self {
        match value {
            Value::Object(mut top) if top.contains_key("data") => {
                let version = read_u32(&top, "version").unwrap_or(SCHEMA_VERSION);
                let minor_version =
                    read_u32(&top, "minor_version").unwrap_or(SCHEMA_MINOR_VERSION);
                let stored_key = match top.get("key") {
                    Some(Value::String(k)) => k.clone(),
                    _ => key.to_string(),
                };
                let data = match top.shift_remove("data") {
                    Some(Value::Object(devices)) => devices_from(devices, key),
                    _ => {
                        warn!(key = %key, "Codes file 'data' is not an object, starting empty");
                        Codes::new()
                    }
                };
                Self {
                    version,
                    minor_version,
                    key: stored_key,
                    data,
                }
            }
            Value::Object(flat) => {
                warn!(key = %key, "Migrating legacy flat codes layout");
                Self {
                    data: devices_from(flat, key),
                    ..Self::empty(key)
                }
            }
            other => {
                warn!(
                    key = %key,
                    kind = json_kind(&other),
                    "Codes file top level is not an object, starting empty"
                );
                Self::empty(key)
            }
        }
    }

    /// Parse raw file contents.
    pub fn from_slice(bytes: &[u8], key: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(Self::from_value(value, key))
    }

    /// Serialize for writing to disk.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

fn devices_from(devices: Map<String, Value>, key: &str) -> Codes {
    devices
        .into_iter()
        .filter_map(|(name, commands)| match commands {
            Value::Object(commands) => Some((name, commands)),
            other => {
                warn!(
                    key = %key,
                    device = %name,
                    kind = json_kind(&other),
                    "Dropping device whose commands are not an object"
                );
                None
            }
        })
        .collect()
}

fn read_u32(top: &Map<String, Value>, field: &str) -> Option<u32> {
    top.get(field)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
