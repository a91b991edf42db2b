//! System handlers: health.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::MethodHandler;
use crate::types::HealthResponse;

/// Reports liveness, version, uptime and the number of active sessions.
pub struct HealthHandler;

#[async_trait]
impl MethodHandler for HealthHandler {
    #[instrument(skip_all, fields(method = "health"))]
    async fn handle(
        &self,
        _params: Option<Value>,
        ctx: &RpcContext,
        _cancel: &CancellationToken,
    ) -> Result<Value, RpcError> {
        let response = HealthResponse {
            status: "ok".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            uptime_secs: ctx.server_start_time.elapsed().as_secs(),
            active_sessions: ctx.session_manager.active_count(),
        };
        serde_json::to_value(response).map_err(|e| RpcError::Internal {
            message: e.to_string(),
        })
    }
}
