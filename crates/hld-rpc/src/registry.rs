//! Method registry and async dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::types::{RpcRequest, RpcResponse};

/// Default time a single handler may run before its request is cancelled.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Default duration above which a request is logged as slow.
pub const DEFAULT_SLOW_REQUEST: Duration = Duration::from_secs(5);

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the given params and context.
    ///
    /// `cancel` is cancelled when the client disconnects, the deadline passes
    /// or the daemon shuts down.
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        cancel: &CancellationToken,
    ) -> Result<Value, RpcError>;
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
    handler_timeout: Duration,
    slow_request: Duration,
}

impl MethodRegistry {
    /// Create an empty registry with default limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_HANDLER_TIMEOUT, DEFAULT_SLOW_REQUEST)
    }

    /// Create an empty registry with explicit timeout and slow-request threshold.
    pub fn with_limits(handler_timeout: Duration, slow_request: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            handler_timeout,
            slow_request,
        }
    }

    /// Register a handler for a method name.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Dispatch a request to the appropriate handler.
    ///
    /// The handler runs under a child of `cancel`; the child is cancelled when
    /// the handler deadline passes so in-flight store calls stop waiting.
    pub async fn dispatch(
        &self,
        request: RpcRequest,
        ctx: &RpcContext,
        cancel: &CancellationToken,
    ) -> RpcResponse {
        let method = request.method.clone();
        counter!("rpc_requests_total", "method" => method.clone()).increment(1);

        let Some(handler) = self.handlers.get(&method) else {
            counter!("rpc_errors_total", "method" => method.clone(), "error_type" => "method_not_found").increment(1);
            let err = RpcError::MethodNotFound { method };
            return RpcResponse::from_error(request.id, &err);
        };

        let token = cancel.child_token();
        let start = Instant::now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RpcError::Cancelled {
                message: format!("request '{method}' cancelled"),
            }),
            outcome = tokio::time::timeout(
                self.handler_timeout,
                handler.handle(request.params, ctx, &token),
            ) => outcome.unwrap_or_else(|_elapsed| {
                token.cancel();
                error!(method, timeout = ?self.handler_timeout, "RPC handler timed out");
                Err(RpcError::Cancelled {
                    message: format!(
                        "handler for '{method}' timed out after {:?}",
                        self.handler_timeout
                    ),
                })
            }),
        };

        let response = match result {
            Ok(value) => RpcResponse::success(request.id, value),
            Err(err) => {
                counter!("rpc_errors_total", "method" => method.clone(), "error_type" => err.code()).increment(1);
                RpcResponse::from_error(request.id, &err)
            }
        };

        let duration = start.elapsed();
        histogram!("rpc_request_duration_seconds", "method" => method.clone())
            .record(duration.as_secs_f64());

        if duration >= self.slow_request {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow RPC request"
            );
        }

        response
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Configured handler deadline.
    pub fn handler_timeout(&self) -> Duration {
        self.handler_timeout
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
