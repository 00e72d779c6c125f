//! In-memory engine.
//!
//! Holds a task tree and forwards lifecycle events to its reporters. Reruns
//! and snapshot updates are recorded rather than executed, which makes it a
//! faithful stand-in for tests and a complete engine for serving a recorded
//! run.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::{Engine, ModuleNode, ModuleResolver, Project, Reporter};
use crate::errors::EngineError;
use crate::stack::StackParser;
use crate::types::{
    ExecutionTarget, File, RunMode, TaskResultPack, TaskState, TestSpecification, TransformResult,
    UserConsoleLog,
};

/// Most recent requests kept by [`MemoryEngine::requests`].
pub const MAX_RECORDED_REQUESTS: usize = 256;

/// A mutation the engine was asked to perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineRequest {
    /// `rerun_files`.
    RerunFiles {
        /// Files to rerun.
        files: Vec<String>,
        /// Whether to clear the test name filter.
        reset_test_name_pattern: bool,
    },
    /// `rerun_test_or_suite`.
    RerunTestOrSuite {
        /// Task id.
        id: String,
        /// File containing the task.
        filename: String,
    },
    /// `update_snapshot`.
    UpdateSnapshot {
        /// Files to update; `None` for all.
        files: Option<Vec<String>>,
    },
}

/// A recorded run, as stored on disk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    /// Collected files with their results.
    #[serde(default)]
    pub files: Vec<File>,
    /// Errors raised outside any test.
    #[serde(default)]
    pub unhandled_errors: Vec<Value>,
    /// Config of the core project.
    #[serde(default)]
    pub config: Value,
    /// Matched test files.
    #[serde(default)]
    pub specifications: Vec<TestSpecification>,
}

/// Engine whose state lives in memory.
pub struct MemoryEngine {
    core: Arc<dyn Project>,
    projects: HashMap<String, Arc<dyn Project>>,
    files: RwLock<Vec<File>>,
    unhandled_errors: RwLock<Vec<Value>>,
    specifications: RwLock<Vec<TestSpecification>>,
    reporters: RwLock<Vec<Arc<dyn Reporter>>>,
    requests: Mutex<VecDeque<EngineRequest>>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("core", &self.core.name())
            .field("projects", &self.projects.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl MemoryEngine {
    /// Empty engine with a single core project.
    pub fn new(core: Arc<dyn Project>) -> Self {
        let mut projects = HashMap::new();
        let _ = projects.insert(core.name().to_owned(), Arc::clone(&core));
        Self {
            core,
            projects,
            files: RwLock::new(Vec::new()),
            unhandled_errors: RwLock::new(Vec::new()),
            specifications: RwLock::new(Vec::new()),
            reporters: RwLock::new(Vec::new()),
            requests: Mutex::new(VecDeque::new()),
        }
    }

    /// Engine serving a recorded run. The core project is named after the
    /// first file's project.
    pub fn from_snapshot(snapshot: RunSnapshot, root: impl Into<String>) -> Self {
        let name = snapshot
            .files
            .first()
            .map(|f| f.project_name.clone())
            .unwrap_or_default();
        let core = StaticProject::new(name, root).with_config(snapshot.config);
        let engine = Self::new(Arc::new(core));
        *engine.files.write() = snapshot.files;
        *engine.unhandled_errors.write() = snapshot.unhandled_errors;
        *engine.specifications.write() = snapshot.specifications;
        engine
    }

    /// Parse a recorded run.
    pub fn load_snapshot(json: &str) -> Result<RunSnapshot, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add another project.
    #[must_use]
    pub fn with_project(mut self, project: Arc<dyn Project>) -> Self {
        let _ = self.projects.insert(project.name().to_owned(), project);
        self
    }

    /// Replace the matched test files.
    pub fn set_specifications(&self, specs: Vec<TestSpecification>) {
        *self.specifications.write() = specs;
    }

    /// Record an error raised outside any test.
    pub fn push_unhandled_error(&self, error: Value) {
        self.unhandled_errors.write().push(error);
    }

    /// The last [`MAX_RECORDED_REQUESTS`] mutations, oldest first.
    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().iter().cloned().collect()
    }

    /// Number of registered reporters.
    pub fn reporter_count(&self) -> usize {
        self.reporters.read().len()
    }

    fn reporters(&self) -> Vec<Arc<dyn Reporter>> {
        self.reporters.read().clone()
    }

    fn record(&self, request: EngineRequest) {
        debug!(?request, "engine request recorded");
        let mut requests = self.requests.lock();
        if requests.len() == MAX_RECORDED_REQUESTS {
            let _ = requests.pop_front();
        }
        requests.push_back(request);
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Replace the collected files and notify reporters.
    pub async fn collect(&self, files: Vec<File>) {
        *self.files.write() = files.clone();
        for reporter in self.reporters() {
            reporter.on_collected(&files).await;
        }
    }

    /// Notify reporters that specifications were collected.
    pub async fn report_specs(&self) {
        let specs: Vec<_> = self
            .specifications
            .read()
            .iter()
            .map(TestSpecification::to_serialized)
            .collect();
        for reporter in self.reporters() {
            reporter.on_specs_collected(&specs).await;
        }
    }

    /// Merge updates and notify reporters.
    pub async fn task_update(&self, packs: &[TaskResultPack]) {
        self.update_tasks(packs);
        self.report_task_update(packs).await;
    }

    /// Forward a console log.
    pub async fn console_log(&self, log: &UserConsoleLog) {
        for reporter in self.reporters() {
            reporter.on_user_console_log(log).await;
        }
    }

    /// Notify reporters that the run finished.
    pub async fn finish(&self) {
        let files = self.files();
        let errors = self.unhandled_errors();
        for reporter in self.reporters() {
            reporter.on_finished(&files, &errors).await;
        }
    }

    /// Notify reporters that coverage was reported.
    pub async fn finish_coverage(&self) {
        for reporter in self.reporters() {
            reporter.on_finished_report_coverage().await;
        }
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    fn files(&self) -> Vec<File> {
        self.files.read().clone()
    }

    fn paths(&self) -> Vec<String> {
        self.files.read().iter().map(|f| f.filepath.clone()).collect()
    }

    fn unhandled_errors(&self) -> Vec<Value> {
        self.unhandled_errors.read().clone()
    }

    fn is_tracked(&self, filepath: &str) -> bool {
        self.files.read().iter().any(|f| f.filepath == filepath)
    }

    fn file_of_task(&self, task_id: &str) -> Option<File> {
        self.files
            .read()
            .iter()
            .find(|f| f.id == task_id || f.find_task(task_id).is_some())
            .cloned()
    }

    fn update_tasks(&self, packs: &[TaskResultPack]) {
        let mut files = self.files.write();
        for (id, result, meta) in packs {
            let skipped = result.as_ref().is_some_and(|r| r.state == TaskState::Skip);
            for file in files.iter_mut() {
                if file.id == *id {
                    file.result.clone_from(result);
                    file.meta.clone_from(meta);
                    if skipped {
                        file.mode = RunMode::Skip;
                    }
                    break;
                }
                if let Some(task) = file.find_task_mut(id) {
                    task.result.clone_from(result);
                    task.meta.clone_from(meta);
                    if skipped {
                        task.mode = RunMode::Skip;
                    }
                    break;
                }
            }
        }
    }

    async fn rerun_files(
        &self,
        files: Vec<String>,
        reset_test_name_pattern: bool,
    ) -> Result<(), EngineError> {
        self.record(EngineRequest::RerunFiles {
            files,
            reset_test_name_pattern,
        });
        Ok(())
    }

    async fn rerun_test_or_suite(&self, id: &str, filename: &str) -> Result<(), EngineError> {
        self.record(EngineRequest::RerunTestOrSuite {
            id: id.to_owned(),
            filename: filename.to_owned(),
        });
        Ok(())
    }

    async fn update_snapshot(&self, files: Option<Vec<String>>) -> Result<(), EngineError> {
        self.record(EngineRequest::UpdateSnapshot { files });
        Ok(())
    }

    fn core_project(&self) -> Arc<dyn Project> {
        Arc::clone(&self.core)
    }

    fn project_by_name(&self, name: &str) -> Option<Arc<dyn Project>> {
        self.projects.get(name).cloned()
    }

    async fn test_specifications(&self) -> Result<Vec<TestSpecification>, EngineError> {
        Ok(self.specifications.read().clone())
    }

    fn add_reporter(&self, reporter: Arc<dyn Reporter>) {
        self.reporters.write().push(reporter);
    }

    async fn report_task_update(&self, packs: &[TaskResultPack]) {
        for reporter in self.reporters() {
            reporter.on_task_update(packs).await;
        }
    }
}

/// A project with fixed config, transforms and module graphs.
pub struct StaticProject {
    name: String,
    root: String,
    config: Value,
    transforms: HashMap<(ExecutionTarget, String), TransformResult>,
    resolvers: HashMap<ExecutionTarget, Arc<dyn ModuleResolver>>,
    browser_parser: Option<Arc<dyn StackParser>>,
}

impl StaticProject {
    /// Project without transforms or modules.
    pub fn new(name: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            config: Value::Null,
            transforms: HashMap::new(),
            resolvers: HashMap::new(),
            browser_parser: None,
        }
    }

    /// Set the serializable config.
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Add a transform result.
    #[must_use]
    pub fn with_transform(
        mut self,
        target: ExecutionTarget,
        id: impl Into<String>,
        result: TransformResult,
    ) -> Self {
        let _ = self.transforms.insert((target, id.into()), result);
        self
    }

    /// Set the module graph of a target.
    #[must_use]
    pub fn with_modules(mut self, target: ExecutionTarget, resolver: Arc<dyn ModuleResolver>) -> Self {
        let _ = self.resolvers.insert(target, resolver);
        self
    }

    /// Set the browser stack parser.
    #[must_use]
    pub fn with_browser_parser(mut self, parser: Arc<dyn StackParser>) -> Self {
        self.browser_parser = Some(parser);
        self
    }
}

#[async_trait]
impl Project for StaticProject {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn serializable_config(&self) -> Value {
        self.config.clone()
    }

    async fn transform_request(
        &self,
        id: &str,
        target: ExecutionTarget,
    ) -> Result<Option<TransformResult>, EngineError> {
        Ok(self.transforms.get(&(target, id.to_owned())).cloned())
    }

    fn module_resolver(&self, target: ExecutionTarget) -> Option<Arc<dyn ModuleResolver>> {
        self.resolvers.get(&target).cloned()
    }

    fn browser_stack_parser(&self) -> Option<Arc<dyn StackParser>> {
        self.browser_parser.clone()
    }
}

/// Fixed module graph. Modules under `node_modules` are externalized.
#[derive(Debug, Default)]
pub struct StaticModules {
    nodes: HashMap<String, ModuleNode>,
}

impl StaticModules {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module and its imports.
    #[must_use]
    pub fn with_module(mut self, id: &str, imports: &[&str]) -> Self {
        let node = ModuleNode {
            id: id.to_owned(),
            file: Some(id.to_owned()),
            imported: imports.iter().map(|s| (*s).to_owned()).collect(),
        };
        let _ = self.nodes.insert(id.to_owned(), node);
        self
    }
}

#[async_trait]
impl ModuleResolver for StaticModules {
    fn module_by_id(&self, id: &str) -> Option<ModuleNode> {
        self.nodes.get(id).cloned()
    }

    async fn externalize(&self, _module: &ModuleNode, id: &str) -> Option<String> {
        id.contains("/node_modules/").then(|| id.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Task, TaskKind, TaskMeta, TaskResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine_with_file() -> MemoryEngine {
        let engine = MemoryEngine::new(Arc::new(StaticProject::new("core", "/repo")));
        let mut file = File::new("f1", "/repo/a.test.ts", "core");
        file.tasks.push(Task {
            id: "t1".into(),
            name: "adds".into(),
            kind: TaskKind::Test,
            mode: RunMode::Run,
            tasks: Vec::new(),
            result: None,
            meta: TaskMeta::new(),
            location: None,
        });
        *engine.files.write() = vec![file];
        engine
    }

    #[derive(Default)]
    struct Counting {
        updates: AtomicUsize,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl Reporter for Counting {
        async fn on_task_update(&self, _packs: &[TaskResultPack]) {
            let _ = self.updates.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_finished(&self, _files: &[File], _errors: &[Value]) {
            let _ = self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn tracked_paths() {
        let engine = engine_with_file();
        assert!(engine.is_tracked("/repo/a.test.ts"));
        assert!(!engine.is_tracked("/repo/b.test.ts"));
        assert_eq!(engine.paths(), vec!["/repo/a.test.ts"]);
        assert_eq!(engine.file_of_task("t1").map(|f| f.id), Some("f1".into()));
        assert_eq!(engine.project_for_task("t1").name(), "core");
    }

    #[test]
    fn update_tasks_merges_result_and_meta() {
        let engine = engine_with_file();
        let mut meta = TaskMeta::new();
        let _ = meta.insert("retried".into(), json!(true));
        engine.update_tasks(&[("t1".into(), Some(TaskResult::new(TaskState::Skip)), meta)]);

        let files = engine.files();
        let task = files[0].find_task("t1").unwrap();
        assert_eq!(task.result.as_ref().map(|r| r.state), Some(TaskState::Skip));
        assert_eq!(task.mode, RunMode::Skip);
        assert_eq!(task.meta["retried"], json!(true));
    }

    #[test]
    fn update_for_unknown_task_is_ignored() {
        let engine = engine_with_file();
        engine.update_tasks(&[("nope".into(), None, TaskMeta::new())]);
        assert_eq!(engine.files(), engine_with_file().files());
    }

    #[tokio::test]
    async fn reporters_receive_events() {
        let engine = engine_with_file();
        let counting = Arc::new(Counting::default());
        engine.add_reporter(counting.clone());

        engine
            .task_update(&[("t1".into(), Some(TaskResult::new(TaskState::Pass)), TaskMeta::new())])
            .await;
        engine.finish().await;

        assert_eq!(counting.updates.load(Ordering::SeqCst), 1);
        assert_eq!(counting.finished.load(Ordering::SeqCst), 1);
        assert_eq!(engine.reporter_count(), 1);
    }

    #[tokio::test]
    async fn mutations_are_recorded() {
        let engine = engine_with_file();
        engine.rerun_files(vec!["/repo/a.test.ts".into()], true).await.unwrap();
        engine.update_snapshot(None).await.unwrap();
        assert_eq!(
            engine.requests(),
            vec![
                EngineRequest::RerunFiles {
                    files: vec!["/repo/a.test.ts".into()],
                    reset_test_name_pattern: true,
                },
                EngineRequest::UpdateSnapshot { files: None },
            ]
        );
    }

    #[tokio::test]
    async fn request_log_keeps_only_the_latest() {
        let engine = engine_with_file();
        for i in 0..MAX_RECORDED_REQUESTS + 10 {
            engine
                .rerun_test_or_suite(&i.to_string(), "/repo/a.test.ts")
                .await
                .unwrap();
        }

        let requests = engine.requests();
        assert_eq!(requests.len(), MAX_RECORDED_REQUESTS);
        assert_eq!(
            requests[0],
            EngineRequest::RerunTestOrSuite {
                id: "10".into(),
                filename: "/repo/a.test.ts".into(),
            }
        );
    }

    #[test]
    fn snapshot_loading() {
        let snapshot = MemoryEngine::load_snapshot(
            r#"{"files":[{"id":"f1","name":"a.test.ts","filepath":"/r/a.test.ts","projectName":"web","tasks":[]}],"config":{"root":"/r"}}"#,
        )
        .unwrap();
        let engine = MemoryEngine::from_snapshot(snapshot, "/r");
        assert_eq!(engine.core_project().name(), "web");
        assert_eq!(engine.core_project().serializable_config(), json!({"root": "/r"}));
        assert!(engine.is_tracked("/r/a.test.ts"));
        assert!(MemoryEngine::load_snapshot("[").is_err());
    }

    #[tokio::test]
    async fn static_project_transforms_by_target() {
        let project = StaticProject::new("core", "/repo").with_transform(
            ExecutionTarget::Browser,
            "/repo/a.ts",
            TransformResult {
                code: "export {}".into(),
                map: None,
                etag: None,
                deps: None,
                dynamic_deps: None,
                source: None,
            },
        );
        assert!(project
            .transform_request("/repo/a.ts", ExecutionTarget::Browser)
            .await
            .unwrap()
            .is_some());
        assert!(project
            .transform_request("/repo/a.ts", ExecutionTarget::Native)
            .await
            .unwrap()
            .is_none());
    }
}
