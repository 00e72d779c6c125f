//! Test source handlers: readTestFile, saveTestFile.
//!
//! Only files the engine tracks and that exist on disk are reachable.

use async_trait::async_trait;
use tracing::{info, instrument};
use vista_codec::Graph;
use vista_rpc::{Args, MethodHandler, RpcError};

use crate::context::BridgeContext;

async fn is_reachable(ctx: &BridgeContext, path: &str) -> bool {
    ctx.engine.is_tracked(path) && tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Read a tracked test file. `null` for anything else.
pub struct ReadTestFileHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for ReadTestFileHandler {
    #[instrument(skip_all, fields(method = "readTestFile"))]
    async fn handle(&self, args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        let id = args.require_str(0, "id")?;
        if !is_reachable(ctx, &id).await {
            return Ok(Graph::new());
        }
        let content = tokio::fs::read_to_string(&id)
            .await
            .map_err(|e| RpcError::internal(format!("failed to read {id}: {e}")))?;
        Ok(Graph::primitive(content.into()))
    }
}

/// Overwrite a tracked test file with exactly the given content.
pub struct SaveTestFileHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for SaveTestFileHandler {
    #[instrument(skip_all, fields(method = "saveTestFile"))]
    async fn handle(&self, args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        let id = args.require_str(0, "id")?;
        let content = args.require_str(1, "content")?;
        if !is_reachable(ctx, &id).await {
            return Err(RpcError::NotRegistered { id });
        }
        tokio::fs::write(&id, content.as_bytes())
            .await
            .map_err(|e| RpcError::internal(format!("failed to write {id}: {e}")))?;
        info!(path = %id, bytes = content.len(), "test file saved");
        Ok(Graph::new())
    }
}
