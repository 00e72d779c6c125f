//! Method vocabulary of the observer protocol.

use std::fmt;

/// Push events the bridge sends to observers. Never acknowledged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientEvent {
    /// Captured console output of a test.
    UserConsoleLog,
    /// The run finished.
    Finished,
    /// Coverage reporting finished.
    FinishedReportCoverage,
    /// Test files were collected.
    Collected,
    /// Incremental task results.
    TaskUpdate,
    /// Test specifications were collected.
    SpecsCollected,
}

impl ClientEvent {
    /// Every event, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::UserConsoleLog,
        Self::Finished,
        Self::FinishedReportCoverage,
        Self::Collected,
        Self::TaskUpdate,
        Self::SpecsCollected,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserConsoleLog => "onUserConsoleLog",
            Self::Finished => "onFinished",
            Self::FinishedReportCoverage => "onFinishedReportCoverage",
            Self::Collected => "onCollected",
            Self::TaskUpdate => "onTaskUpdate",
            Self::SpecsCollected => "onSpecsCollected",
        }
    }

    /// Look up by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Methods observers may call on the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServerMethod {
    /// Forward task results into the engine.
    OnTaskUpdate,
    /// All collected files.
    GetFiles,
    /// All collected file paths.
    GetPaths,
    /// Source of a tracked test file.
    ReadTestFile,
    /// Overwrite a tracked test file.
    SaveTestFile,
    /// Rerun files.
    Rerun,
    /// Rerun a single test or suite.
    RerunTestOrSuite,
    /// Serializable config of the core project.
    GetConfig,
    /// Transform output of a module.
    GetTransformResult,
    /// Module dependency graph of a file.
    GetModuleGraph,
    /// Update snapshots.
    UpdateSnapshot,
    /// Errors raised outside any test.
    GetUnhandledErrors,
    /// Test specifications.
    GetTestFiles,
}

impl ServerMethod {
    /// Every method, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::OnTaskUpdate,
        Self::GetFiles,
        Self::GetPaths,
        Self::ReadTestFile,
        Self::SaveTestFile,
        Self::Rerun,
        Self::RerunTestOrSuite,
        Self::GetConfig,
        Self::GetTransformResult,
        Self::GetModuleGraph,
        Self::UpdateSnapshot,
        Self::GetUnhandledErrors,
        Self::GetTestFiles,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnTaskUpdate => "onTaskUpdate",
            Self::GetFiles => "getFiles",
            Self::GetPaths => "getPaths",
            Self::ReadTestFile => "readTestFile",
            Self::SaveTestFile => "saveTestFile",
            Self::Rerun => "rerun",
            Self::RerunTestOrSuite => "rerunTestOrSuite",
            Self::GetConfig => "getConfig",
            Self::GetTransformResult => "getTransformResult",
            Self::GetModuleGraph => "getModuleGraph",
            Self::UpdateSnapshot => "updateSnapshot",
            Self::GetUnhandledErrors => "getUnhandledErrors",
            Self::GetTestFiles => "getTestFiles",
        }
    }
}

impl fmt::Display for ServerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let events: HashSet<_> = ClientEvent::ALL.iter().map(|e| e.as_str()).collect();
        assert_eq!(events.len(), ClientEvent::ALL.len());
        let methods: HashSet<_> = ServerMethod::ALL.iter().map(|m| m.as_str()).collect();
        assert_eq!(methods.len(), ServerMethod::ALL.len());
    }

    #[test]
    fn event_lookup() {
        assert_eq!(ClientEvent::from_name("onTaskUpdate"), Some(ClientEvent::TaskUpdate));
        assert_eq!(ClientEvent::from_name("getFiles"), None);
        assert_eq!(ServerMethod::GetModuleGraph.to_string(), "getModuleGraph");
    }
}
