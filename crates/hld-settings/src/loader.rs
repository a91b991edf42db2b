//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`DaemonSettings::default()`]
//! 2. If `~/.humanlayer/daemon.json` exists, deep-merge user values over defaults
//! 3. Apply `HUMANLAYER_*` environment overrides (highest priority)
//! 4. Expand a leading `~/` in paths and validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{DaemonSettings, humanlayer_dir};

/// Env var overriding the socket path.
pub const ENV_DAEMON_SOCKET: &str = "HUMANLAYER_DAEMON_SOCKET";
/// Env var overriding the database path.
pub const ENV_DATABASE_PATH: &str = "HUMANLAYER_DATABASE_PATH";
/// Env var overriding the log level.
pub const ENV_LOG_LEVEL: &str = "HUMANLAYER_LOG_LEVEL";
/// Env var overriding the pool size.
pub const ENV_DB_POOL_SIZE: &str = "HUMANLAYER_DB_POOL_SIZE";
/// Env var overriding the per-request deadline.
pub const ENV_HANDLER_TIMEOUT_MS: &str = "HUMANLAYER_HANDLER_TIMEOUT_MS";

/// Resolve the path to the settings file (`~/.humanlayer/daemon.json`).
pub fn settings_path() -> PathBuf {
    humanlayer_dir().join("daemon.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<DaemonSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<DaemonSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load settings using `env` as the environment source.
pub fn load_with_env<F>(path: &Path, env: F) -> Result<DaemonSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(DaemonSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: DaemonSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    settings.socket_path = expand_home(&settings.socket_path);
    settings.database_path = expand_home(&settings.database_path);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides read through `env`.
///
/// Empty strings are treated as unset. Out-of-range numbers are ignored with
/// a warning and the file/default value is kept.
pub fn apply_env_overrides<F>(settings: &mut DaemonSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| env(name).filter(|v| !v.is_empty());

    if let Some(v) = read(ENV_DAEMON_SOCKET) {
        settings.socket_path = PathBuf::from(v);
    }
    if let Some(v) = read(ENV_DATABASE_PATH) {
        settings.database_path = PathBuf::from(v);
    }
    if let Some(v) = read(ENV_LOG_LEVEL) {
        settings.logging.level = v;
    }
    if let Some(v) = read(ENV_DB_POOL_SIZE) {
        match parse_u32_range(&v, 1, 64) {
            Some(n) => settings.store.pool_size = n,
            None => warn!(key = ENV_DB_POOL_SIZE, value = %v, "invalid pool size env var, ignoring"),
        }
    }
    if let Some(v) = read(ENV_HANDLER_TIMEOUT_MS) {
        match parse_u64_range(&v, 100, 3_600_000) {
            Some(n) => settings.rpc.handler_timeout_ms = n,
            None => {
                warn!(key = ENV_HANDLER_TIMEOUT_MS, value = %v, "invalid timeout env var, ignoring");
            }
        }
    }
}

/// Replace a leading `~/` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(rest)
        }
        Err(_) => path.to_path_buf(),
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}
