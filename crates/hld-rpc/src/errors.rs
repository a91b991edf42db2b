//! RPC error codes and error type.

use hld_store::StoreError;
use tracing::error;

use crate::types::RpcErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Request could not be decoded or failed validation.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
/// Addressed session or conversation does not exist.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Operation not valid in the session's current status.
pub const INVALID_STATE: &str = "INVALID_STATE";
/// Method not found in the registry.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Request was cancelled or ran past its deadline.
pub const CANCELLED: &str = "CANCELLED";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Request line was not valid JSON.
pub const PARSE_ERROR: &str = "PARSE_ERROR";

/// RPC error type returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Undecodable or invalid request parameters.
    #[error("{message}")]
    InvalidRequest {
        /// Description of what is wrong.
        message: String,
    },

    /// Requested resource not found.
    #[error("{message}")]
    NotFound {
        /// Human-readable message.
        message: String,
    },

    /// Operation rejected by the session state machine.
    #[error("{message}")]
    InvalidState {
        /// Human-readable message.
        message: String,
    },

    /// Request cancelled by shutdown, disconnect or deadline.
    #[error("{message}")]
    Cancelled {
        /// Human-readable message.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// No handler registered for the method.
    #[error("method not found: {method}")]
    MethodNotFound {
        /// Requested method name.
        method: String,
    },
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::NotFound { .. } => NOT_FOUND,
            Self::InvalidState { .. } => INVALID_STATE,
            Self::Cancelled { .. } => CANCELLED,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
        }
    }

    /// Wrap a store error as `"<context>: <cause>"`, keeping its kind.
    pub fn from_store(context: &str, err: &StoreError) -> Self {
        let message = format!("{context}: {err}");
        match err {
            StoreError::SessionNotFound(_) | StoreError::ConversationNotFound(_) => {
                Self::NotFound { message }
            }
            StoreError::InvalidState(_) => Self::InvalidState { message },
            StoreError::InvalidArgument(_) | StoreError::Conflict(_) => {
                Self::InvalidRequest { message }
            }
            StoreError::Cancelled => Self::Cancelled { message },
            StoreError::Sqlite(_)
            | StoreError::Pool(_)
            | StoreError::Migration { .. }
            | StoreError::Internal(_) => {
                error!(error = %err, context, "store failure");
                Self::Internal { message }
            }
        }
    }
}
