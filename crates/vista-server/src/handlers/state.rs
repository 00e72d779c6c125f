//! Engine state handlers: onTaskUpdate, getFiles, getPaths,
//! getUnhandledErrors, getConfig, getTestFiles.

use async_trait::async_trait;
use tracing::{debug, instrument};
use vista_codec::Graph;
use vista_core::TaskResultPack;
use vista_core::graph::files_graph;
use vista_rpc::{Args, MethodHandler, RpcError};

use super::{engine_error, to_graph};
use crate::context::BridgeContext;

/// Merge task results sent by an observer, then report them.
///
/// The only inbound call that triggers an outbound broadcast.
pub struct OnTaskUpdateHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for OnTaskUpdateHandler {
    #[instrument(skip_all, fields(method = "onTaskUpdate"))]
    async fn handle(&self, args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        let packs: Vec<TaskResultPack> = args.parse(0, "packs")?;
        debug!(packs = packs.len(), "task update from observer");
        ctx.engine.update_tasks(&packs);
        ctx.engine.report_task_update(&packs).await;
        Ok(Graph::new())
    }
}

/// All collected files, with `file` / `suite` back-references.
pub struct GetFilesHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for GetFilesHandler {
    #[instrument(skip_all, fields(method = "getFiles"))]
    async fn handle(&self, _args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        files_graph(&ctx.engine.files())
            .map_err(|e| RpcError::internal(format!("failed to encode files: {e}")))
    }
}

/// Paths of all collected files.
pub struct GetPathsHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for GetPathsHandler {
    #[instrument(skip_all, fields(method = "getPaths"))]
    async fn handle(&self, _args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        to_graph(&ctx.engine.paths())
    }
}

/// Errors raised outside any test.
pub struct GetUnhandledErrorsHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for GetUnhandledErrorsHandler {
    #[instrument(skip_all, fields(method = "getUnhandledErrors"))]
    async fn handle(&self, _args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        to_graph(&ctx.engine.unhandled_errors())
    }
}

/// Serializable config of the core project.
pub struct GetConfigHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for GetConfigHandler {
    #[instrument(skip_all, fields(method = "getConfig"))]
    async fn handle(&self, _args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        Ok(Graph::from_json(
            &ctx.engine.core_project().serializable_config(),
        ))
    }
}

/// Test files matched by the include patterns, as
/// `[{ name, root }, moduleId, { pool }]`.
pub struct GetTestFilesHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for GetTestFilesHandler {
    #[instrument(skip_all, fields(method = "getTestFiles"))]
    async fn handle(&self, _args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        let specs = ctx
            .engine
            .test_specifications()
            .await
            .map_err(engine_error)?;
        let serialized: Vec<_> = specs.iter().map(|s| s.to_serialized()).collect();
        to_graph(&serialized)
    }
}
