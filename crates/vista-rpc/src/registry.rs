//! Method registry and async dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::warn;
use vista_codec::Graph;

use crate::args::Args;
use crate::errors::RpcError;

/// RPC requests total (counter, labels: method).
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// RPC errors total (counter, labels: method, error_type).
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// RPC request duration seconds (histogram, labels: method).
pub const RPC_REQUEST_DURATION_SECONDS: &str = "rpc_request_duration_seconds";

/// Trait implemented by every locally callable method.
///
/// `C` is the context the channel owner hands to every invocation.
#[async_trait]
pub trait MethodHandler<C>: Send + Sync {
    /// Execute the handler with the given arguments and context.
    async fn handle(&self, args: Args, ctx: &C) -> Result<Graph, RpcError>;
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry<C> {
    handlers: HashMap<String, Arc<dyn MethodHandler<C>>>,
}

impl<C: Send + Sync> MethodRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a method name.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler<C> + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Run the handler for `method`.
    pub async fn dispatch(&self, method: &str, args: Args, ctx: &C) -> Result<Graph, RpcError> {
        counter!(RPC_REQUESTS_TOTAL, "method" => method.to_owned()).increment(1);

        let Some(handler) = self.handlers.get(method) else {
            counter!(RPC_ERRORS_TOTAL, "method" => method.to_owned(), "error_type" => "method_not_found").increment(1);
            return Err(RpcError::MethodNotFound {
                method: method.to_owned(),
            });
        };

        let start = std::time::Instant::now();
        let result = handler.handle(args, ctx).await;
        if let Err(err) = &result {
            counter!(RPC_ERRORS_TOTAL, "method" => method.to_owned(), "error_type" => err.code().to_owned()).increment(1);
        }

        let duration = start.elapsed();
        histogram!(RPC_REQUEST_DURATION_SECONDS, "method" => method.to_owned())
            .record(duration.as_secs_f64());

        if duration.as_secs() >= 5 {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow RPC request"
            );
        }

        result
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
}

impl<C: Send + Sync> Default for MethodRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
