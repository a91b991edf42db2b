//! RPC dependency-injection context.

use std::sync::Arc;
use std::time::Instant;

use hld_session::SessionManager;
use hld_store::ConversationStore;

/// Shared context passed to every RPC handler.
pub struct RpcContext {
    /// Session lifecycle manager.
    pub session_manager: Arc<SessionManager>,
    /// Store for direct read queries.
    pub store: Arc<dyn ConversationStore>,
    /// When the server started (for uptime calculation).
    pub server_start_time: Instant,
}

impl RpcContext {
    /// Build a context whose reads go to the manager's store.
    pub fn new(session_manager: Arc<SessionManager>) -> Self {
        let store = Arc::clone(session_manager.store());
        Self {
            session_manager,
            store,
            server_start_time: Instant::now(),
        }
    }
}
