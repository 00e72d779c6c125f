//! Engine error type.

use std::path::PathBuf;

/// Errors raised by an [`Engine`](crate::engine::Engine) or
/// [`Project`](crate::engine::Project).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No project with that name.
    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    /// The project has no pipeline for the requested target.
    #[error("project '{project}' has no {target} pipeline")]
    TargetUnavailable {
        /// Project name.
        project: String,
        /// Requested target.
        target: &'static str,
    },

    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Stored state could not be parsed.
    #[error("invalid state: {0}")]
    InvalidState(#[from] serde_json::Error),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            EngineError::ProjectNotFound("web".into()).to_string(),
            "project 'web' not found"
        );
        let err = EngineError::TargetUnavailable {
            project: "core".into(),
            target: "browser",
        };
        assert_eq!(err.to_string(), "project 'core' has no browser pipeline");
    }
}
