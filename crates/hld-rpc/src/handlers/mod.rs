//! RPC handler modules and registration.

pub mod session;
pub mod system;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::RpcError;
use crate::registry::MethodRegistry;

/// `getConversation` method name.
pub const GET_CONVERSATION: &str = "getConversation";
/// `getSessionState` method name.
pub const GET_SESSION_STATE: &str = "getSessionState";
/// `listSessions` method name.
pub const LIST_SESSIONS: &str = "listSessions";
/// `health` method name.
pub const HEALTH: &str = "health";

/// Register all RPC handlers with the registry.
pub fn register_all(registry: &mut MethodRegistry) {
    // Session
    registry.register(GET_CONVERSATION, session::GetConversationHandler);
    registry.register(GET_SESSION_STATE, session::GetSessionStateHandler);
    registry.register(LIST_SESSIONS, session::ListSessionsHandler);

    // System
    registry.register(HEALTH, system::HealthHandler);
}

/// Decode handler params into a typed request. Absent or `null` params
/// decode as the type's default.
pub(crate) fn decode_params<T: DeserializeOwned + Default>(
    params: Option<Value>,
) -> Result<T, RpcError> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| RpcError::InvalidRequest {
            message: format!("invalid request: {e}"),
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GetSessionStateRequest;
    use serde_json::json;

    #[test]
    fn register_all_installs_every_method() {
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);
        assert_eq!(
            registry.methods(),
            vec![GET_CONVERSATION, GET_SESSION_STATE, HEALTH, LIST_SESSIONS]
        );
    }

    #[test]
    fn decode_missing_params_is_default() {
        let req: GetSessionStateRequest = decode_params(None).unwrap();
        assert!(req.session_id.is_empty());
        let req: GetSessionStateRequest = decode_params(Some(Value::Null)).unwrap();
        assert!(req.session_id.is_empty());
    }

    #[test]
    fn decode_wrong_shape_is_invalid_request() {
        let err = decode_params::<GetSessionStateRequest>(Some(json!("invalid json")))
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::INVALID_REQUEST);
        assert!(err.to_string().starts_with("invalid request: "));
    }
}
