//! Settings types. Every struct deserializes from camelCase JSON and falls
//! back to its compiled default for missing keys.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Base directory for daemon state (`~/.humanlayer`).
pub fn humanlayer_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".humanlayer")
}

/// Top-level daemon settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonSettings {
    /// Unix socket the daemon listens on.
    pub socket_path: PathBuf,
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// Log output.
    pub logging: LoggingSettings,
    /// Connection pool tuning.
    pub store: StoreSettings,
    /// Request dispatch limits.
    pub rpc: RpcSettings,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        let base = humanlayer_dir();
        Self {
            socket_path: base.join("daemon.sock"),
            database_path: base.join("daemon.db"),
            logging: LoggingSettings::default(),
            store: StoreSettings::default(),
            rpc: RpcSettings::default(),
        }
    }
}

impl DaemonSettings {
    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(SettingsError::InvalidValue("socketPath is empty".into()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(SettingsError::InvalidValue("databasePath is empty".into()));
        }
        if self.store.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "store.poolSize must be at least 1".into(),
            ));
        }
        if self.rpc.handler_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "rpc.handlerTimeoutMs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Conversation store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 30_000,
        }
    }
}

/// Request dispatch settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcSettings {
    /// Per-request deadline in milliseconds.
    pub handler_timeout_ms: u64,
    /// Requests slower than this are logged at warn.
    pub slow_request_ms: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 60_000,
            slow_request_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_live_under_humanlayer_dir() {
        let settings = DaemonSettings::default();
        assert!(settings.socket_path.ends_with(".humanlayer/daemon.sock"));
        assert!(settings.database_path.ends_with(".humanlayer/daemon.db"));
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.store.pool_size, 8);
        assert_eq!(settings.rpc.handler_timeout_ms, 60_000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(DaemonSettings::default()).unwrap();
        assert!(value.get("socketPath").is_some());
        assert!(value["store"].get("poolSize").is_some());
        assert!(value["rpc"].get("handlerTimeoutMs").is_some());
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let settings: DaemonSettings =
            serde_json::from_value(json!({"rpc": {"slowRequestMs": 10}})).unwrap();
        assert_eq!(settings.rpc.slow_request_ms, 10);
        assert_eq!(settings.rpc.handler_timeout_ms, 60_000);
        assert_eq!(settings.store, StoreSettings::default());
    }

    #[test]
    fn validate_rejects_zero_pool() {
        let mut settings = DaemonSettings::default();
        settings.store.pool_size = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut settings = DaemonSettings::default();
        settings.rpc.handler_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }
}
