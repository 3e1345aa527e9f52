use core_rpc::RpcError;
use thiserror::Error;

/// Failure classes with stable numeric codes. Front ends match on the code, never the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskErrorKind {
    /// rustup is not installed (or its home directory does not exist).
    MissingToolchainManager,
    ToolchainSelectFailed,
    CreateOutputFailed,
    ProcessFailed,
    MalformedDependency,
    ReadingToolchainsDir,
    ToolchainParse,
    Cancelled,
}

impl TaskErrorKind {
    pub const fn code(self) -> i64 {
        match self {
            TaskErrorKind::MissingToolchainManager => 1,
            TaskErrorKind::ToolchainSelectFailed => 2,
            TaskErrorKind::CreateOutputFailed => 3,
            TaskErrorKind::ProcessFailed => 4,
            TaskErrorKind::MalformedDependency => 5,
            TaskErrorKind::ReadingToolchainsDir => 6,
            TaskErrorKind::ToolchainParse => 7,
            TaskErrorKind::Cancelled => 8,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        use TaskErrorKind::*;
        [
            MissingToolchainManager,
            ToolchainSelectFailed,
            CreateOutputFailed,
            ProcessFailed,
            MalformedDependency,
            ReadingToolchainsDir,
            ToolchainParse,
            Cancelled,
        ]
        .into_iter()
        .find(|k| k.code() == code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn code(&self) -> i64 {
        self.kind.code()
    }

    pub fn missing_toolchain_manager() -> Self {
        Self::new(
            TaskErrorKind::MissingToolchainManager,
            "rustup is not installed; install it from https://rustup.rs",
        )
    }

    pub fn to_rpc_error(&self) -> RpcError {
        RpcError::new(self.message.clone(), self.code())
    }
}

impl From<RpcError> for TaskError {
    /// Unknown codes are treated as generic process failures.
    fn from(err: RpcError) -> Self {
        let kind = TaskErrorKind::from_code(err.code).unwrap_or(TaskErrorKind::ProcessFailed);
        Self::new(kind, err.message)
    }
}
