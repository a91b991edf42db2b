//! # hld-rpc
//!
//! Request/response surface of the daemon.
//!
//! - **Wire types**: [`RpcRequest`], [`RpcResponse`] and the method payloads
//! - **Errors**: [`RpcError`] with stable string codes
//! - **Dispatch**: [`MethodRegistry`] routes a method name to a
//!   [`MethodHandler`] under a per-request cancellation token and deadline
//! - **Handlers**: `getConversation`, `getSessionState`, `listSessions`,
//!   `health`

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod types;

pub use context::RpcContext;
pub use errors::RpcError;
pub use handlers::register_all;
pub use registry::{DEFAULT_HANDLER_TIMEOUT, DEFAULT_SLOW_REQUEST, MethodHandler, MethodRegistry};
pub use types::{
    ConversationKey, GetConversationRequest, GetConversationResponse, GetSessionStateRequest,
    GetSessionStateResponse, HealthResponse, ListSessionsResponse, RpcErrorBody, RpcRequest,
    RpcResponse,
};
