//! # hld-settings
//!
//! Layered configuration for the hld daemon.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`DaemonSettings::default()`]
//! 2. **User file**: `~/.humanlayer/daemon.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HUMANLAYER_*` overrides
//!
//! Command-line flags are applied on top by the daemon binary. The loaded
//! value is passed explicitly to whoever needs it; there is no global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, expand_home, load_settings, load_settings_from_path,
    load_with_env, settings_path,
};
pub use types::{DaemonSettings, LoggingSettings, RpcSettings, StoreSettings, humanlayer_dir};
