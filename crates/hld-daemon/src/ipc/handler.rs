//! Line dispatch: parses one request line and routes it through the
//! `MethodRegistry`.

use hld_rpc::errors::{INVALID_REQUEST, PARSE_ERROR};
use hld_rpc::{MethodRegistry, RpcContext, RpcRequest, RpcResponse};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Handle one request line and produce its response.
///
/// Invalid JSON answers `PARSE_ERROR` with a null id. Valid JSON that is not
/// a request answers `INVALID_REQUEST`, echoing its `id` when one is present.
#[instrument(skip_all, fields(method))]
pub async fn handle_line(
    line: &str,
    registry: &MethodRegistry,
    ctx: &RpcContext,
    cancel: &CancellationToken,
) -> RpcResponse {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "invalid JSON received");
            return RpcResponse::error(Value::Null, PARSE_ERROR, format!("parse error: {e}"));
        }
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "malformed request envelope");
            return RpcResponse::error(id, INVALID_REQUEST, format!("invalid request: {e}"));
        }
    };

    let _ = tracing::Span::current().record("method", request.method.as_str());
    debug!(method = %request.method, id = %request.id, "dispatching RPC");

    if !registry.has_method(&request.method) {
        warn!(method = %request.method, "unknown RPC method");
    }

    registry.dispatch(request, ctx, cancel).await
}

/// Serialize a response to one line (without the trailing newline).
pub fn encode_response(response: &RpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize response");
        format!(
            r#"{{"id":null,"error":{{"code":"INTERNAL_ERROR","message":"failed to serialize response: {e}"}}}}"#
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hld_rpc::register_all;
    use hld_session::SessionManager;
    use hld_store::{ConversationStore, SqliteConversationStore};
    use serde_json::json;

    fn make_ctx() -> RpcContext {
        let store: Arc<dyn ConversationStore> =
            Arc::new(SqliteConversationStore::open_in_memory().unwrap());
        RpcContext::new(Arc::new(SessionManager::new(store)))
    }

    fn make_registry() -> MethodRegistry {
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);
        registry
    }

    #[tokio::test]
    async fn valid_request_dispatches() {
        let resp = handle_line(
            r#"{"id": 1, "method": "health"}"#,
            &make_registry(),
            &make_ctx(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(resp.id, json!(1));
        assert_eq!(resp.result.unwrap()["status"], "ok");
    }

    #[tokio::test]
    async fn invalid_json_is_parse_error() {
        let resp = handle_line(
            "not json at all",
            &make_registry(),
            &make_ctx(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(resp.id, Value::Null);
        assert_eq!(resp.error.unwrap().code, PARSE_ERROR);
    }

    #[tokio::test]
    async fn missing_method_is_invalid_request_with_id() {
        let resp = handle_line(
            r#"{"id": "r9"}"#,
            &make_registry(),
            &make_ctx(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(resp.id, json!("r9"));
        assert_eq!(resp.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn non_object_json_is_invalid_request() {
        let resp = handle_line(
            "[1, 2, 3]",
            &make_registry(),
            &make_ctx(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(resp.id, Value::Null);
        assert_eq!(resp.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let resp = handle_line(
            r#"{"id": 2, "method": "deleteEverything"}"#,
            &make_registry(),
            &make_ctx(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "METHOD_NOT_FOUND");
    }

    #[test]
    fn encoded_response_is_single_line() {
        let line = encode_response(&RpcResponse::success(json!(1), json!({"a": "x\ny"})));
        assert!(!line.contains('\n'));
        let back: RpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(back.result.unwrap()["a"], "x\ny");
    }
}
