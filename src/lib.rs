//! brcodes - watched, file-backed store for captured Broadlink IR/RF codes.
//!
//! Codes live in one JSON file per hub (device → command → opaque code).
//! The library keeps that mapping in memory, persists edits through a
//! single writer per store, reloads when the file is edited elsewhere, and
//! derives the button entities a home-automation host should expose.
//!
//! # Modules
//!
//! - `store`: `CodeStore`, the on-disk document and its persistence
//! - `watcher`: debounced file watcher feeding store reloads
//! - `registry`: one store per hub address
//! - `entities`: button/device descriptors and registry synchronization
//! - `naming`: MAC normalization and id/display-name helpers
//! - `config`: settings file handling
//! - `error`: error types with user-facing hints
#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod logging;
pub mod naming;
pub mod registry;
pub mod store;
pub mod watcher;

pub use config::Settings;
pub use error::{CodesError, Result};
pub use registry::StoreRegistry;
pub use store::{CodeStore, Codes, Commands, JsonFileStorage, ReloadOutcome, StoreEvent};
