//! Module pipeline handlers: getTransformResult, getModuleGraph.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};
use vista_codec::Graph;
use vista_core::module_graph::build_module_graph;
use vista_core::{EngineError, ExecutionTarget, Project};
use vista_rpc::{Args, MethodHandler, RpcError};

use super::{engine_error, to_graph};
use crate::context::BridgeContext;

fn target_name(target: ExecutionTarget) -> &'static str {
    match target {
        ExecutionTarget::Native => "native",
        ExecutionTarget::Browser => "browser",
    }
}

/// Parse the shared `(project, id, browser?)` arguments.
fn module_request(
    args: &Args,
    ctx: &BridgeContext,
) -> Result<(Arc<dyn Project>, String, ExecutionTarget), RpcError> {
    let project_name = args.require_str(0, "project")?;
    let id = args.require_str(1, "id")?;
    let target = ExecutionTarget::from_browser_flag(args.optional(2, "browser")?);
    let project = ctx
        .engine
        .project_by_name(&project_name)
        .ok_or_else(|| engine_error(EngineError::ProjectNotFound(project_name)))?;
    Ok((project, id, target))
}

/// Transform output of a module, with its original source when readable.
pub struct GetTransformResultHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for GetTransformResultHandler {
    #[instrument(skip_all, fields(method = "getTransformResult"))]
    async fn handle(&self, args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        let (project, id, target) = module_request(&args, ctx)?;
        let Some(mut result) = project
            .transform_request(&id, target)
            .await
            .map_err(engine_error)?
        else {
            return Ok(Graph::new());
        };
        if result.source.is_none() {
            match tokio::fs::read_to_string(&id).await {
                Ok(source) => result.source = Some(source),
                Err(e) => debug!(id = %id, error = %e, "source not readable"),
            }
        }
        to_graph(&result)
    }
}

/// Dependency graph of a module: every reachable module classified as
/// externalized or inlined.
pub struct GetModuleGraphHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for GetModuleGraphHandler {
    #[instrument(skip_all, fields(method = "getModuleGraph"))]
    async fn handle(&self, args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        let (project, id, target) = module_request(&args, ctx)?;
        let resolver = project.module_resolver(target).ok_or_else(|| {
            engine_error(EngineError::TargetUnavailable {
                project: project.name().to_owned(),
                target: target_name(target),
            })
        })?;
        let data = build_module_graph(resolver.as_ref(), &id).await;
        to_graph(&data)
    }
}
