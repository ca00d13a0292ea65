//! # Request Dispatch Table
//!
//! The single table mapping request types to handlers, shared by the local
//! short-circuit path and the remote receive loop. Both paths MUST dispatch
//! through this table - a second switch that drifts from the first is the
//! biggest correctness risk in the bridge, so there is exactly one.
//!
//! Request types are a closed, statically registered set; nothing here ever
//! evaluates payload-supplied code.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

use super::errors::{BridgeError, BridgeResult};

/// Metadata handed to a handler alongside the payload
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Shard that sent the request
    pub origin_shard: String,
    /// Correlation id of the request envelope
    pub correlation_id: uuid::Uuid,
    /// Whether the request arrived via the local short-circuit path
    pub local: bool,
}

/// Handler for one request type
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, ctx: RequestContext, payload: Value) -> BridgeResult<Value>;
}

type HandlerFuture = Pin<Box<dyn Future<Output = BridgeResult<Value>> + Send>>;
type HandlerFn = dyn Fn(RequestContext, Value) -> HandlerFuture + Send + Sync;

/// Adapter turning a closure into a [`RequestHandler`]
struct FnHandler {
    inner: Box<HandlerFn>,
}

#[async_trait]
impl RequestHandler for FnHandler {
    async fn handle(&self, ctx: RequestContext, payload: Value) -> BridgeResult<Value> {
        (self.inner)(ctx, payload).await
    }
}

/// Closed registry of request handlers keyed by request type
#[derive(Default)]
pub struct DispatchTable {
    handlers: DashMap<String, Arc<dyn RequestHandler>>,
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("request_types", &self.handlers.len())
            .finish()
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a request type. Registration happens at
    /// startup; later registrations for the same type replace the handler.
    pub fn register(&self, request_type: &str, handler: Arc<dyn RequestHandler>) {
        debug!(request_type = %request_type, "Registering bridge handler");
        self.handlers.insert(request_type.to_string(), handler);
    }

    /// Register a closure-based handler
    pub fn register_fn<F, Fut>(&self, request_type: &str, handler: F)
    where
        F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<Value>> + Send + 'static,
    {
        let handler = FnHandler {
            inner: Box::new(move |ctx, payload| Box::pin(handler(ctx, payload))),
        };
        self.register(request_type, Arc::new(handler));
    }

    /// Dispatch a request through the table. Used identically by the local
    /// and remote paths.
    pub async fn dispatch(
        &self,
        request_type: &str,
        ctx: RequestContext,
        payload: Value,
    ) -> BridgeResult<Value> {
        let handler = self
            .handlers
            .get(request_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BridgeError::unknown_request_type(request_type))?;

        handler.handle(ctx, payload).await
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_ctx() -> RequestContext {
        RequestContext {
            origin_shard: "shard-1".to_string(),
            correlation_id: uuid::Uuid::new_v4(),
            local: false,
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_request_type() {
        let table = DispatchTable::new();
        table.register_fn("ping", |_ctx, _payload| async {
            Ok(json!({"pong": true}))
        });

        let result = table.dispatch("ping", test_ctx(), json!({})).await.unwrap();
        assert_eq!(result, json!({"pong": true}));
    }

    #[tokio::test]
    async fn test_unknown_request_type_fails_fast() {
        let table = DispatchTable::new();
        let result = table.dispatch("nope", test_ctx(), json!({})).await;
        assert!(matches!(
            result,
            Err(BridgeError::UnknownRequestType { .. })
        ));
    }

    #[tokio::test]
    async fn test_handler_errors_propagate() {
        let table = DispatchTable::new();
        table.register_fn("get_user", |_ctx, payload| async move {
            if payload.get("user_id").is_none() {
                return Err(BridgeError::handler("get_user", "missing user_id"));
            }
            Ok(json!({"found": false}))
        });

        let result = table.dispatch("get_user", test_ctx(), json!({})).await;
        assert!(matches!(result, Err(BridgeError::Handler { .. })));
    }

    #[tokio::test]
    async fn test_handler_sees_context() {
        let table = DispatchTable::new();
        table.register_fn("whoami", |ctx, _payload| async move {
            Ok(json!({"origin": ctx.origin_shard}))
        });

        let result = table
            .dispatch("whoami", test_ctx(), json!({}))
            .await
            .unwrap();
        assert_eq!(result, json!({"origin": "shard-1"}));
    }
}
