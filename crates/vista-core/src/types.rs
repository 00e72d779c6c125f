//! Test-run domain types as they travel to observers.
//!
//! Field names follow the observers' camelCase wire shape. Fields the bridge
//! does not interpret are kept in `extra` maps so nothing an engine reports
//! is lost on the way through.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form metadata attached to a task.
pub type TaskMeta = Map<String, Value>;

/// How a task was scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Runs normally.
    #[default]
    Run,
    /// Skipped.
    Skip,
    /// Focused.
    Only,
    /// Placeholder.
    Todo,
    /// Waiting for a worker.
    Queued,
}

/// Outcome state of a task result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Still running.
    Run,
    /// Skipped.
    Skip,
    /// Focused and not yet finished.
    Only,
    /// Placeholder.
    Todo,
    /// Waiting for a worker.
    Queued,
    /// Passed.
    Pass,
    /// Failed.
    Fail,
}

/// Kind of task node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// A single test.
    #[default]
    Test,
    /// A group of tasks (files are suites too).
    Suite,
    /// An engine-defined task.
    Custom,
}

/// Source position of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// One parsed stack frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedStack {
    /// Function name, empty when anonymous.
    pub method: String,
    /// File path.
    pub file: String,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// An error with optional assertion diff data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorWithDiff {
    /// Error class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Message.
    #[serde(default)]
    pub message: String,
    /// Raw stack text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Raw stack text captured by a runner that could not keep `stack`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_str: Option<String>,
    /// Parsed frames, filled in before the error reaches observers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacks: Option<Vec<ParsedStack>>,
    /// Expected value of a failed assertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Actual value of a failed assertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// Rendered diff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// Everything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorWithDiff {
    /// The stack text to parse, preferring `stack`.
    pub fn raw_stack(&self) -> Option<&str> {
        self.stack
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.stack_str.as_deref())
    }
}

/// A reported error: either an error object or a thrown primitive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestError {
    /// An error object.
    Object(Box<ErrorWithDiff>),
    /// A thrown string, number, boolean or null.
    Primitive(Value),
}

impl TestError {
    /// Whether this is a thrown primitive rather than an error object.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive(_))
    }
}

/// Result of a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// Outcome.
    pub state: TaskState,
    /// Milliseconds spent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Epoch milliseconds when the task started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    /// Heap usage in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heap: Option<u64>,
    /// Hook states by hook name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Map<String, Value>>,
    /// Retries performed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    /// Repeats performed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_count: Option<u32>,
    /// Errors raised by the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<TestError>>,
    /// Everything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskResult {
    /// A result with only a state.
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            duration: None,
            start_time: None,
            heap: None,
            hooks: None,
            retry_count: None,
            repeat_count: None,
            errors: None,
            extra: Map::new(),
        }
    }
}

/// A test, suite or custom task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Node kind.
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    /// Scheduling mode.
    #[serde(default)]
    pub mode: RunMode,
    /// Children (suites only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,
    /// Latest result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Metadata.
    #[serde(default)]
    pub meta: TaskMeta,
    /// Source position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// A collected test file: the root suite of its task tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Unique id.
    pub id: String,
    /// Path relative to the project root.
    pub name: String,
    /// Absolute path.
    pub filepath: String,
    /// Owning project.
    #[serde(default)]
    pub project_name: String,
    /// Node kind; always a suite.
    #[serde(rename = "type", default = "suite_kind")]
    pub kind: TaskKind,
    /// Worker pool the file runs in (`"browser"` for browser runs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    /// Collection time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect_duration: Option<f64>,
    /// Setup time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_duration: Option<f64>,
    /// Environment load time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_load: Option<f64>,
    /// Worker preparation time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepare_duration: Option<f64>,
    /// Scheduling mode.
    #[serde(default)]
    pub mode: RunMode,
    /// Top-level tasks.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Latest result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Metadata.
    #[serde(default)]
    pub meta: TaskMeta,
}

fn suite_kind() -> TaskKind {
    TaskKind::Suite
}

impl File {
    /// An empty file in `project`.
    pub fn new(id: impl Into<String>, filepath: impl Into<String>, project: impl Into<String>) -> Self {
        let filepath = filepath.into();
        Self {
            id: id.into(),
            name: filepath.rsplit('/').next().unwrap_or_default().to_owned(),
            filepath,
            project_name: project.into(),
            kind: TaskKind::Suite,
            pool: None,
            collect_duration: None,
            setup_duration: None,
            environment_load: None,
            prepare_duration: None,
            mode: RunMode::Run,
            tasks: Vec::new(),
            result: None,
            meta: TaskMeta::new(),
        }
    }

    /// Whether the file runs in a browser.
    pub fn is_browser(&self) -> bool {
        self.pool.as_deref() == Some("browser")
    }

    /// Find a task anywhere in this file's tree.
    pub fn find_task(&self, id: &str) -> Option<&Task> {
        let mut stack: Vec<&Task> = self.tasks.iter().collect();
        while let Some(task) = stack.pop() {
            if task.id == id {
                return Some(task);
            }
            stack.extend(task.tasks.iter());
        }
        None
    }

    /// Mutable variant of [`File::find_task`].
    pub fn find_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        let mut stack: Vec<&mut Task> = self.tasks.iter_mut().collect();
        while let Some(task) = stack.pop() {
            if task.id == id {
                return Some(task);
            }
            stack.extend(task.tasks.iter_mut());
        }
        None
    }
}

/// `(task id, result, meta)` delta reported while tasks run.
pub type TaskResultPack = (String, Option<TaskResult>, TaskMeta);

/// Which output stream a console log came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Console output captured during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConsoleLog {
    /// Text written.
    pub content: String,
    /// Stack of the call site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Whether the log came from a browser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<bool>,
    /// Output stream.
    #[serde(rename = "type")]
    pub stream: LogStream,
    /// Task that produced the output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Epoch milliseconds.
    pub time: f64,
    /// Size in bytes.
    pub size: u64,
}

/// Module dependency graph of an entry module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleGraphData {
    /// Module id to the ids it imports.
    pub graph: std::collections::BTreeMap<String, Vec<String>>,
    /// Modules loaded by the host runtime directly.
    pub externalized: Vec<String>,
    /// Modules transformed and inlined by the pipeline.
    pub inlined: Vec<String>,
}

/// Output of the module transform pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResult {
    /// Transformed code.
    pub code: String,
    /// Source map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<Value>,
    /// Cache tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Static dependencies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deps: Option<Vec<String>>,
    /// Dynamic dependencies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_deps: Option<Vec<String>>,
    /// Original source text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Which pipeline a module request targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExecutionTarget {
    /// Node-side pipeline.
    #[default]
    Native,
    /// Browser pipeline.
    Browser,
}

impl ExecutionTarget {
    /// Target for an optional `browser` flag.
    pub fn from_browser_flag(browser: Option<bool>) -> Self {
        if browser.unwrap_or(false) {
            Self::Browser
        } else {
            Self::Native
        }
    }
}

/// Project identity inside a serialized specification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecProject {
    /// Project name.
    pub name: String,
    /// Project root directory.
    pub root: String,
}

/// Pool info inside a serialized specification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecPool {
    /// Worker pool label.
    pub pool: String,
}

/// `[{ name, root }, moduleId, { pool }]`.
pub type SerializedTestSpecification = (SpecProject, String, SpecPool);

/// A test file matched by the engine's include patterns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpecification {
    /// Project name.
    pub project_name: String,
    /// Project root directory.
    pub project_root: String,
    /// Module path.
    pub module_id: String,
    /// Worker pool label.
    pub pool: String,
}

impl TestSpecification {
    /// Wire tuple form.
    pub fn to_serialized(&self) -> SerializedTestSpecification {
        (
            SpecProject {
                name: self.project_name.clone(),
                root: self.project_root.clone(),
            },
            self.module_id.clone(),
            SpecPool {
                pool: self.pool.clone(),
            },
        )
    }
}
