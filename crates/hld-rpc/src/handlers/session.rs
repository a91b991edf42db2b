//! Session handlers: getConversation, getSessionState, listSessions.
//!
//! Reads go straight to the store; the session manager owns every write.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handlers::decode_params;
use crate::registry::MethodHandler;
use crate::types::{
    ConversationKey, GetConversationRequest, GetConversationResponse, GetSessionStateRequest,
    GetSessionStateResponse, ListSessionsResponse,
};

fn to_result<T: serde::Serialize>(response: &T) -> Result<Value, RpcError> {
    serde_json::to_value(response).map_err(|e| RpcError::Internal {
        message: format!("failed to encode response: {e}"),
    })
}

/// Returns the events of one session, or of every session sharing a claude
/// session ID.
pub struct GetConversationHandler;

#[async_trait]
impl MethodHandler for GetConversationHandler {
    #[instrument(skip_all, fields(method = "getConversation"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        cancel: &CancellationToken,
    ) -> Result<Value, RpcError> {
        let request: GetConversationRequest = decode_params(params)?;
        let key = request.key().ok_or_else(|| RpcError::InvalidRequest {
            message: "either session_id or claude_session_id is required".into(),
        })?;

        let events = match &key {
            ConversationKey::Session(session_id) => {
                ctx.store.get_session_conversation(cancel, session_id).await
            }
            ConversationKey::ClaudeSession(claude_session_id) => {
                ctx.store.get_conversation(cancel, claude_session_id).await
            }
        }
        .map_err(|e| RpcError::from_store("failed to get conversation", &e))?;

        debug!(?key, count = events.len(), "conversation loaded");
        to_result(&GetConversationResponse { events })
    }
}

/// Returns the current record of one session.
pub struct GetSessionStateHandler;

#[async_trait]
impl MethodHandler for GetSessionStateHandler {
    #[instrument(skip_all, fields(method = "getSessionState"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        cancel: &CancellationToken,
    ) -> Result<Value, RpcError> {
        let request: GetSessionStateRequest = decode_params(params)?;
        if request.session_id.is_empty() {
            return Err(RpcError::InvalidRequest {
                message: "session_id is required".into(),
            });
        }

        let session = ctx
            .store
            .get_session(cancel, &request.session_id)
            .await
            .map_err(|e| RpcError::from_store("failed to get session", &e))?;
        to_result(&GetSessionStateResponse { session })
    }
}

/// Lists every session, most recently active first.
pub struct ListSessionsHandler;

#[async_trait]
impl MethodHandler for ListSessionsHandler {
    #[instrument(skip_all, fields(method = "listSessions"))]
    async fn handle(
        &self,
        _params: Option<Value>,
        ctx: &RpcContext,
        cancel: &CancellationToken,
    ) -> Result<Value, RpcError> {
        let sessions = ctx
            .store
            .list_sessions(cancel)
            .await
            .map_err(|e| RpcError::from_store("failed to list sessions", &e))?;
        to_result(&ListSessionsResponse { sessions })
    }
}
