//! Interfaces between the bridge and a test engine.
//!
//! The engine owns all execution state. The bridge only reads through these
//! traits and forwards mutations; it never keeps its own copy.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::EngineError;
use crate::stack::StackParser;
use crate::types::{
    ExecutionTarget, File, SerializedTestSpecification, TaskResultPack, TestSpecification,
    TransformResult, UserConsoleLog,
};

/// A test engine as seen by the bridge.
#[async_trait]
pub trait Engine: Send + Sync {
    // ── State accessors ─────────────────────────────────────────────

    /// All collected files.
    fn files(&self) -> Vec<File>;

    /// Paths of all collected files.
    fn paths(&self) -> Vec<String>;

    /// Errors raised outside any test.
    fn unhandled_errors(&self) -> Vec<Value>;

    /// Whether `filepath` is a test file the engine tracks.
    fn is_tracked(&self, filepath: &str) -> bool;

    /// The file that contains task `task_id` (or is that task).
    fn file_of_task(&self, task_id: &str) -> Option<File>;

    // ── Mutators ────────────────────────────────────────────────────

    /// Merge result deltas into the task tree.
    fn update_tasks(&self, packs: &[TaskResultPack]);

    /// Rerun the given files.
    async fn rerun_files(
        &self,
        files: Vec<String>,
        reset_test_name_pattern: bool,
    ) -> Result<(), EngineError>;

    /// Rerun one test or suite.
    async fn rerun_test_or_suite(&self, id: &str, filename: &str) -> Result<(), EngineError>;

    /// Update snapshots of the given files, or of every file.
    async fn update_snapshot(&self, files: Option<Vec<String>>) -> Result<(), EngineError>;

    // ── Projects and specifications ─────────────────────────────────

    /// The core project.
    fn core_project(&self) -> Arc<dyn Project>;

    /// Project by name.
    fn project_by_name(&self, name: &str) -> Option<Arc<dyn Project>>;

    /// Project that owns task `task_id`, falling back to the core project.
    fn project_for_task(&self, task_id: &str) -> Arc<dyn Project> {
        self.file_of_task(task_id)
            .and_then(|file| self.project_by_name(&file.project_name))
            .unwrap_or_else(|| self.core_project())
    }

    /// Test files currently matched by the include patterns.
    async fn test_specifications(&self) -> Result<Vec<TestSpecification>, EngineError>;

    // ── Reporting ───────────────────────────────────────────────────

    /// Add a lifecycle reporter.
    fn add_reporter(&self, reporter: Arc<dyn Reporter>);

    /// Fan task updates out to every reporter.
    async fn report_task_update(&self, packs: &[TaskResultPack]);
}

/// One project of an engine: a config and a module pipeline per target.
#[async_trait]
pub trait Project: Send + Sync {
    /// Project name.
    fn name(&self) -> &str;

    /// Project root directory.
    fn root(&self) -> &str;

    /// Config safe to hand to observers.
    fn serializable_config(&self) -> Value;

    /// Transform a module for `target`. `Ok(None)` when the pipeline has no
    /// result for it.
    async fn transform_request(
        &self,
        id: &str,
        target: ExecutionTarget,
    ) -> Result<Option<TransformResult>, EngineError>;

    /// Module graph access for `target`.
    fn module_resolver(&self, target: ExecutionTarget) -> Option<Arc<dyn ModuleResolver>>;

    /// Stack parser for errors raised in the browser.
    fn browser_stack_parser(&self) -> Option<Arc<dyn StackParser>> {
        None
    }
}

/// A module known to the resolution layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleNode {
    /// Module id, possibly with a `?v=` cache suffix.
    pub id: String,
    /// Resolved file on disk.
    pub file: Option<String>,
    /// Ids of the modules it imports.
    pub imported: Vec<String>,
}

/// The module resolution layer of one pipeline.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// Module by id.
    fn module_by_id(&self, id: &str) -> Option<ModuleNode>;

    /// Rewritten id when `module` is loaded by the host runtime instead of
    /// being inlined; `None` when it is inlined.
    async fn externalize(&self, module: &ModuleNode, id: &str) -> Option<String>;
}

/// Engine lifecycle callbacks. Every method defaults to a no-op.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Test files were collected.
    async fn on_collected(&self, _files: &[File]) {}

    /// Test specifications were collected.
    async fn on_specs_collected(&self, _specs: &[SerializedTestSpecification]) {}

    /// Task results changed.
    async fn on_task_update(&self, _packs: &[TaskResultPack]) {}

    /// The run finished.
    async fn on_finished(&self, _files: &[File], _errors: &[Value]) {}

    /// Coverage reporting finished.
    async fn on_finished_report_coverage(&self) {}

    /// A test wrote to the console.
    async fn on_user_console_log(&self, _log: &UserConsoleLog) {}
}
