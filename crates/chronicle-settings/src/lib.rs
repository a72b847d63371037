//! # chronicle-settings
//!
//! Configuration for the chronicle state engine.
//!
//! Settings are built from three layers (in priority order):
//! 1. **Compiled defaults**: [`EngineSettings::default()`]
//! 2. **Settings file**: JSON deep-merged over defaults
//! 3. **Environment variables**: `CHRONICLE_*` overrides (highest priority)
//!
//! The resulting [`EngineSettings`] value is owned by the host and threaded
//! explicitly into the reducer and the replay engine.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings_from_path,
    load_settings_from_str,
};
pub use types::*;
