//! # chronicle-settings
//!
//! Configuration for the event store and context engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ChronicleSettings::default()`]
//! 2. **User file**: `~/.chronicle/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CHRONICLE_*` overrides (highest priority)
//!
//! The loaded value is handed to constructors explicitly; there is no
//! process-global settings instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
