//! Engine reporter that pushes lifecycle events to every observer.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;
use vista_codec::{CodecError, Graph};
use vista_core::graph::{files_graph, plain_graph};
use vista_core::stack::{NativeStackParser, StackParser};
use vista_core::{
    Engine, File, Reporter, SerializedTestSpecification, TaskResultPack, TestError,
    UserConsoleLog,
};
use vista_rpc::{Args, ClientEvent};

use crate::websocket::ConnectionRegistry;

/// Forwards engine events to the connection registry.
///
/// Every callback returns immediately when no observer is connected, so an
/// unobserved run pays for neither encoding nor stack parsing.
pub struct WebSocketReporter {
    registry: Arc<ConnectionRegistry>,
    engine: Weak<dyn Engine>,
    native_parser: Arc<dyn StackParser>,
}

impl WebSocketReporter {
    /// Reporter for `engine`. Holds the engine weakly, since the engine
    /// holds its reporters.
    pub fn new(registry: Arc<ConnectionRegistry>, engine: &Arc<dyn Engine>) -> Self {
        Self {
            registry,
            engine: Arc::downgrade(engine),
            native_parser: Arc::new(NativeStackParser::new()),
        }
    }

    /// Replace the parser used for errors raised outside the browser.
    #[must_use]
    pub fn with_native_parser(mut self, parser: Arc<dyn StackParser>) -> Self {
        self.native_parser = parser;
        self
    }

    /// Attach parsed frames to every error object in `packs`.
    ///
    /// Browser files use their project's browser parser; a project without
    /// one leaves the error untouched. Errors that already carry frames are
    /// not parsed again.
    fn enrich(&self, packs: &mut [TaskResultPack]) {
        let engine = self.engine.upgrade();
        for (task_id, result, _meta) in packs.iter_mut() {
            let Some(errors) = result.as_mut().and_then(|r| r.errors.as_mut()) else {
                continue;
            };
            if errors.iter().all(TestError::is_primitive) {
                continue;
            }
            let Some(parser) = self.parser_for(engine.as_deref(), task_id) else {
                continue;
            };
            for error in errors.iter_mut() {
                if let TestError::Object(error) = error {
                    let _ = parser.parse_error(error);
                }
            }
        }
    }

    fn parser_for(&self, engine: Option<&dyn Engine>, task_id: &str) -> Option<Arc<dyn StackParser>> {
        let is_browser = engine
            .and_then(|e| e.file_of_task(task_id))
            .is_some_and(|file| file.is_browser());
        if !is_browser {
            return Some(Arc::clone(&self.native_parser));
        }
        engine.and_then(|e| e.project_for_task(task_id).browser_stack_parser())
    }

    async fn send(&self, event: ClientEvent, args: Result<Args, CodecError>) {
        match args {
            Ok(args) => {
                let _ = self.registry.broadcast(event, args).await;
            }
            Err(err) => warn!(event = %event, error = %err, "failed to encode event"),
        }
    }
}

fn single(graph: Result<Graph, CodecError>) -> Result<Args, CodecError> {
    Ok(Args::from_graphs([graph?]))
}

#[async_trait]
impl Reporter for WebSocketReporter {
    async fn on_collected(&self, files: &[File]) {
        if self.registry.is_empty().await {
            return;
        }
        self.send(ClientEvent::Collected, single(files_graph(files))).await;
    }

    async fn on_specs_collected(&self, specs: &[SerializedTestSpecification]) {
        if self.registry.is_empty().await {
            return;
        }
        self.send(ClientEvent::SpecsCollected, single(plain_graph(specs))).await;
    }

    async fn on_task_update(&self, packs: &[TaskResultPack]) {
        if self.registry.is_empty().await {
            return;
        }
        let mut packs = packs.to_vec();
        self.enrich(&mut packs);
        self.send(ClientEvent::TaskUpdate, single(plain_graph(&packs))).await;
    }

    async fn on_finished(&self, files: &[File], errors: &[Value]) {
        if self.registry.is_empty().await {
            return;
        }
        let args = files_graph(files)
            .and_then(|files| Ok(Args::from_graphs([files, plain_graph(errors)?])));
        self.send(ClientEvent::Finished, args).await;
    }

    async fn on_finished_report_coverage(&self) {
        if self.registry.is_empty().await {
            return;
        }
        self.send(ClientEvent::FinishedReportCoverage, Ok(Args::empty())).await;
    }

    async fn on_user_console_log(&self, log: &UserConsoleLog) {
        if self.registry.is_empty().await {
            return;
        }
        self.send(ClientEvent::UserConsoleLog, single(plain_graph(log))).await;
    }
}
