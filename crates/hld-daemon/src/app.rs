//! Wiring from settings to store, registry and server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hld_rpc::{MethodRegistry, RpcContext, register_all};
use hld_session::SessionManager;
use hld_settings::DaemonSettings;
use hld_store::{ConnectionConfig, ConversationStore, SqliteConversationStore};

use crate::server::DaemonServer;

/// Pool configuration derived from settings.
pub fn store_config(settings: &DaemonSettings) -> ConnectionConfig {
    ConnectionConfig {
        pool_size: settings.store.pool_size,
        busy_timeout_ms: settings.store.busy_timeout_ms,
        ..ConnectionConfig::default()
    }
}

/// Registry with every method installed and limits taken from settings.
pub fn build_registry(settings: &DaemonSettings) -> MethodRegistry {
    let mut registry = MethodRegistry::with_limits(
        Duration::from_millis(settings.rpc.handler_timeout_ms),
        Duration::from_millis(settings.rpc.slow_request_ms),
    );
    register_all(&mut registry);
    registry
}

/// Open (and migrate) the database at `path`.
pub fn open_store(
    path: &Path,
    settings: &DaemonSettings,
) -> hld_store::Result<Arc<dyn ConversationStore>> {
    let store = SqliteConversationStore::open(&path.to_string_lossy(), &store_config(settings))?;
    Ok(Arc::new(store))
}

/// Server for `settings.socket_path` over `manager`.
pub fn build_server(settings: &DaemonSettings, manager: Arc<SessionManager>) -> DaemonServer {
    DaemonServer::new(
        settings.socket_path.clone(),
        build_registry(settings),
        RpcContext::new(manager),
    )
}
