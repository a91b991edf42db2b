//! # hld
//!
//! Daemon binary: loads settings, opens the store, and serves requests on the
//! Unix socket until SIGINT or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hld_daemon::{app, logging, shutdown};
use hld_session::SessionManager;
use hld_settings::{DaemonSettings, expand_home};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// HumanLayer session daemon.
#[derive(Parser, Debug)]
#[command(name = "hld", about = "HumanLayer session daemon", version)]
struct Cli {
    /// Unix socket to listen on (overrides settings).
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log level or filter directive (overrides settings; `RUST_LOG` wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Settings file to load instead of `~/.humanlayer/daemon.json`.
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut DaemonSettings) {
        if let Some(socket) = &self.socket {
            settings.socket_path = expand_home(socket);
        }
        if let Some(db_path) = &self.db_path {
            settings.database_path = expand_home(db_path);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<DaemonSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(hld_settings::settings_path);
    let mut settings = hld_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    logging::init_subscriber(&settings.logging.level);

    ensure_parent_dir(&settings.database_path)?;
    let store = app::open_store(&settings.database_path, &settings).with_context(|| {
        format!(
            "failed to open database {}",
            settings.database_path.display()
        )
    })?;
    let manager = Arc::new(SessionManager::new(store));

    let orphaned = manager
        .reconcile_orphans(&CancellationToken::new())
        .await
        .context("failed to reconcile sessions from a previous run")?;
    if orphaned > 0 {
        info!(orphaned, "marked sessions from a previous run as failed");
    }

    let server = app::build_server(&settings, Arc::clone(&manager));
    let handle = server.listen().context("failed to bind socket")?;
    info!(
        socket = %settings.socket_path.display(),
        database = %settings.database_path.display(),
        methods = server.registry().methods().len(),
        handler_timeout_ms = server.registry().handler_timeout().as_millis(),
        "hld listening"
    );

    let signal = shutdown::wait_for_signal().await;
    match &signal {
        Ok(sig) => info!(signal = sig.as_str(), "shutting down"),
        Err(e) => error!(error = %e, "signal handler failed, shutting down"),
    }

    let drained = server.shutdown().drain(handle, shutdown::DRAIN_GRACE).await;
    let failed = manager.shutdown(&CancellationToken::new()).await;
    server.remove_socket();
    info!(?drained, failed_sessions = failed, "shutdown complete");

    let _ = signal.context("failed to listen for shutdown signals")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_no_overrides() {
        let cli = Cli::parse_from(["hld"]);
        assert!(cli.socket.is_none());
        assert!(cli.db_path.is_none());
        assert!(cli.log_level.is_none());
        assert!(cli.settings.is_none());
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "hld",
            "--socket",
            "/tmp/hld.sock",
            "--db-path",
            "/tmp/hld.db",
            "--log-level",
            "debug",
        ]);
        let mut settings = DaemonSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.socket_path, PathBuf::from("/tmp/hld.sock"));
        assert_eq!(settings.database_path, PathBuf::from("/tmp/hld.db"));
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn settings_file_then_cli() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("daemon.json");
        std::fs::write(
            &file,
            r#"{"socketPath": "/tmp/from-file.sock", "logging": {"level": "warn"}}"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "hld",
            "--settings",
            file.to_str().unwrap(),
            "--log-level",
            "trace",
        ]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.socket_path, PathBuf::from("/tmp/from-file.sock"));
        assert_eq!(settings.logging.level, "trace");
    }

    #[test]
    fn ensure_parent_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("daemon.db");
        ensure_parent_dir(&path).unwrap();
        assert!(path.parent().unwrap().exists());
    }
}
