//! Run control handlers: rerun, rerunTestOrSuite, updateSnapshot.
//!
//! All of them delegate to the engine and are safe to retry.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;
use vista_codec::Graph;
use vista_rpc::{Args, MethodHandler, RpcError};

use super::engine_error;
use crate::context::BridgeContext;

/// Rerun a set of files.
pub struct RerunHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for RerunHandler {
    #[instrument(skip_all, fields(method = "rerun"))]
    async fn handle(&self, args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        let files: Vec<String> = args.parse(0, "files")?;
        let reset = args
            .optional::<bool>(1, "resetTestNamePattern")?
            .unwrap_or(false);
        ctx.engine
            .rerun_files(files, reset)
            .await
            .map_err(engine_error)?;
        Ok(Graph::new())
    }
}

/// Rerun one test or suite.
pub struct RerunTestOrSuiteHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for RerunTestOrSuiteHandler {
    #[instrument(skip_all, fields(method = "rerunTestOrSuite"))]
    async fn handle(&self, args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        let id = args.require_str(0, "id")?;
        let filename = args.require_str(1, "filename")?;
        ctx.engine
            .rerun_test_or_suite(&id, &filename)
            .await
            .map_err(engine_error)?;
        Ok(Graph::new())
    }
}

/// The part of a file `updateSnapshot` needs.
#[derive(Deserialize)]
struct FileRef {
    filepath: String,
}

/// Update snapshots of one file, or of every file when none is given.
pub struct UpdateSnapshotHandler;

#[async_trait]
impl MethodHandler<BridgeContext> for UpdateSnapshotHandler {
    #[instrument(skip_all, fields(method = "updateSnapshot"))]
    async fn handle(&self, args: Args, ctx: &BridgeContext) -> Result<Graph, RpcError> {
        let files = args
            .optional::<FileRef>(0, "file")?
            .map(|file| vec![file.filepath]);
        ctx.engine
            .update_snapshot(files)
            .await
            .map_err(engine_error)?;
        Ok(Graph::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_for, make_engine};
    use assert_matches::assert_matches;
    use serde_json::json;
    use vista_core::File;
    use vista_core::graph::file_graph;
    use vista_core::memory::EngineRequest;

    #[tokio::test]
    async fn rerun_defaults_reset_to_false() {
        let engine = make_engine();
        let ctx = context_for(engine.clone());

        RerunHandler
            .handle(Args::from_json([json!(["/repo/a.test.ts"])]), &ctx)
            .await
            .unwrap();
        RerunHandler
            .handle(Args::from_json([json!(["/repo/b.test.ts"]), json!(true)]), &ctx)
            .await
            .unwrap();

        assert_eq!(
            engine.requests(),
            vec![
                EngineRequest::RerunFiles {
                    files: vec!["/repo/a.test.ts".into()],
                    reset_test_name_pattern: false,
                },
                EngineRequest::RerunFiles {
                    files: vec!["/repo/b.test.ts".into()],
                    reset_test_name_pattern: true,
                },
            ]
        );
    }

    #[tokio::test]
    async fn rerun_requires_file_list() {
        let ctx = context_for(make_engine());
        let err = RerunHandler.handle(Args::empty(), &ctx).await.unwrap_err();
        assert_matches!(err, RpcError::InvalidParams { .. });
    }

    #[tokio::test]
    async fn rerun_single_task() {
        let engine = make_engine();
        let ctx = context_for(engine.clone());
        RerunTestOrSuiteHandler
            .handle(Args::from_json([json!("t1"), json!("/repo/a.test.ts")]), &ctx)
            .await
            .unwrap();
        assert_eq!(
            engine.requests(),
            vec![EngineRequest::RerunTestOrSuite {
                id: "t1".into(),
                filename: "/repo/a.test.ts".into(),
            }]
        );
    }

    #[tokio::test]
    async fn update_snapshot_all_or_one() {
        let engine = make_engine();
        let ctx = context_for(engine.clone());

        UpdateSnapshotHandler.handle(Args::empty(), &ctx).await.unwrap();

        // Observers send the linked file they hold, cycles included.
        let linked = file_graph(&File::new("f1", "/repo/a.test.ts", "core")).unwrap();
        UpdateSnapshotHandler
            .handle(Args::from_graphs([linked]), &ctx)
            .await
            .unwrap();

        assert_eq!(
            engine.requests(),
            vec![
                EngineRequest::UpdateSnapshot { files: None },
                EngineRequest::UpdateSnapshot {
                    files: Some(vec!["/repo/a.test.ts".into()]),
                },
            ]
        );
    }
}
