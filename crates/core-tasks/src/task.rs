use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Run,
    Check,
    Test,
    Clean,
}

impl TaskKind {
    /// cargo subcommand. `run` only builds; the artifact is executed separately.
    pub fn cargo_subcommand(self) -> &'static str {
        match self {
            TaskKind::Run | TaskKind::Check => "build",
            TaskKind::Test => "test",
            TaskKind::Clean => "clean",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Run => "run",
            TaskKind::Check => "check",
            TaskKind::Test => "test",
            TaskKind::Clean => "clean",
        }
    }
}

/// One build/run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub toolchain: String,
    pub code: String,
    #[serde(rename = "task_type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub backtrace: bool,
    #[serde(default)]
    pub release: bool,
}

/// Terminal result of a task whose subprocess ran (or failed to start).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Produced binary, if any.
    pub executable: Option<PathBuf>,
}

/// One line of subprocess output, line terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    Stdout(String),
    Stderr(String),
}

impl TaskOutput {
    pub fn text(&self) -> &str {
        match self {
            TaskOutput::Stdout(s) | TaskOutput::Stderr(s) => s,
        }
    }
}
