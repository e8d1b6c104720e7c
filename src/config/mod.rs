//! Configuration for code stores.
//!
//! Settings come from an optional TOML file and are shared by every store a
//! [`crate::registry::StoreRegistry`] creates.

mod path;
mod settings;

pub use path::{default_config_path, default_storage_dir, home_dir, resolve_path};
pub use settings::Settings;
