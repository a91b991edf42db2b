//! Wire-format types: one JSON object per line in each direction.
//!
//! A response carries either `result` or `error`, never both.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hld_store::{ConversationEvent, Session};

use crate::errors::RpcError;

/// Incoming request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Caller-chosen identifier (string or number), echoed back.
    #[serde(default)]
    pub id: Value,
    /// Method name (e.g. `getConversation`).
    pub method: String,
    /// Optional parameters object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Outgoing response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed request identifier.
    pub id: Value,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Structured error body inside an [`RpcResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Machine-readable error code (e.g. `NOT_FOUND`).
    pub code: String,
    /// Human-readable message including the cause chain.
    pub message: String,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: Value, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Build an error response from a handler error.
    pub fn from_error(id: Value, err: &RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(err.to_error_body()),
        }
    }
}

// ── Method payloads ─────────────────────────────────────────────────

/// Parameters of `getConversation`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConversationRequest {
    /// Local session whose events to return.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    /// Claude session whose events to return across continuations.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub claude_session_id: String,
}

/// Which identifier a conversation lookup resolves through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversationKey {
    /// Lookup by local session ID.
    Session(String),
    /// Lookup by claude session ID.
    ClaudeSession(String),
}

impl GetConversationRequest {
    /// Collapse the two optional IDs into one key. `session_id` wins when
    /// both are present.
    pub fn key(&self) -> Option<ConversationKey> {
        if !self.session_id.is_empty() {
            Some(ConversationKey::Session(self.session_id.clone()))
        } else if !self.claude_session_id.is_empty() {
            Some(ConversationKey::ClaudeSession(self.claude_session_id.clone()))
        } else {
            None
        }
    }
}

/// Result of `getConversation`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetConversationResponse {
    /// Events in conversation order.
    pub events: Vec<ConversationEvent>,
}

/// Parameters of `getSessionState`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSessionStateRequest {
    /// Session to fetch.
    #[serde(default)]
    pub session_id: String,
}

/// Result of `getSessionState`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetSessionStateResponse {
    /// Current session record.
    pub session: Session,
}

/// Result of `listSessions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    /// Sessions, most recently active first.
    pub sessions: Vec<Session>,
}

/// Result of `health`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the daemon answers.
    pub status: String,
    /// Daemon version.
    pub version: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Sessions this daemon is currently driving.
    pub active_sessions: usize,
}
