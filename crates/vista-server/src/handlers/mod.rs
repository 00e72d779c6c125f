//! Method handlers observers can call, and their registration.

pub mod files;
pub mod modules;
pub mod run;
pub mod state;

use serde::Serialize;
use vista_codec::Graph;
use vista_core::EngineError;
use vista_core::graph::plain_graph;
use vista_rpc::{MethodRegistry, RpcError, ServerMethod};

use crate::context::BridgeContext;

/// Register every observer-callable method.
pub fn register_all(registry: &mut MethodRegistry<BridgeContext>) {
    // Engine state
    registry.register(ServerMethod::OnTaskUpdate.as_str(), state::OnTaskUpdateHandler);
    registry.register(ServerMethod::GetFiles.as_str(), state::GetFilesHandler);
    registry.register(ServerMethod::GetPaths.as_str(), state::GetPathsHandler);
    registry.register(
        ServerMethod::GetUnhandledErrors.as_str(),
        state::GetUnhandledErrorsHandler,
    );
    registry.register(ServerMethod::GetConfig.as_str(), state::GetConfigHandler);
    registry.register(ServerMethod::GetTestFiles.as_str(), state::GetTestFilesHandler);

    // Test sources
    registry.register(ServerMethod::ReadTestFile.as_str(), files::ReadTestFileHandler);
    registry.register(ServerMethod::SaveTestFile.as_str(), files::SaveTestFileHandler);

    // Runs
    registry.register(ServerMethod::Rerun.as_str(), run::RerunHandler);
    registry.register(
        ServerMethod::RerunTestOrSuite.as_str(),
        run::RerunTestOrSuiteHandler,
    );
    registry.register(ServerMethod::UpdateSnapshot.as_str(), run::UpdateSnapshotHandler);

    // Module pipeline
    registry.register(
        ServerMethod::GetTransformResult.as_str(),
        modules::GetTransformResultHandler,
    );
    registry.register(
        ServerMethod::GetModuleGraph.as_str(),
        modules::GetModuleGraphHandler,
    );
}

/// Encode a handler result as a plain graph.
pub(crate) fn to_graph<T: Serialize + ?Sized>(value: &T) -> Result<Graph, RpcError> {
    plain_graph(value).map_err(|e| RpcError::internal(format!("failed to encode result: {e}")))
}

/// Map an engine failure onto the wire error family.
pub(crate) fn engine_error(err: EngineError) -> RpcError {
    match err {
        EngineError::ProjectNotFound(_) | EngineError::TargetUnavailable { .. } => {
            RpcError::NotFound {
                message: err.to_string(),
            }
        }
        other => RpcError::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn every_server_method_is_registered() {
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);
        for method in ServerMethod::ALL {
            assert!(registry.has_method(method.as_str()), "{method} missing");
        }
        assert_eq!(registry.methods().len(), ServerMethod::ALL.len());
    }

    #[test]
    fn engine_errors_map_to_codes() {
        assert_matches!(
            engine_error(EngineError::ProjectNotFound("web".into())),
            RpcError::NotFound { .. }
        );
        assert_matches!(
            engine_error(EngineError::Other("boom".into())),
            RpcError::Internal { message } if message == "boom"
        );
    }
}
