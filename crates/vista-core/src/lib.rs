//! # vista-core
//!
//! What the bridge knows about a test engine.
//!
//! - [`types`]: files, tasks, results, console logs and friends
//! - [`engine`]: the [`Engine`](engine::Engine) and
//!   [`Project`](engine::Project) interfaces the bridge consumes, and the
//!   [`Reporter`](engine::Reporter) interface it implements
//! - [`graph`]: encodes files with their `file` / `suite` back-references
//! - [`stack`]: stack trace parsing
//! - [`module_graph`]: module dependency walk
//! - [`memory`]: an in-memory engine

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod graph;
pub mod memory;
pub mod module_graph;
pub mod stack;
pub mod types;

pub use engine::{Engine, ModuleNode, ModuleResolver, Project, Reporter};
pub use errors::EngineError;
pub use types::*;
