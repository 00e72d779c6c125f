//! # vista-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`VistaSettings::default()`]
//! 2. **User file**: `~/.vista/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `VISTA_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
