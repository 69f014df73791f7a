use serde_json::{Map, Value};
use thiserror::Error;

/// Exit code used when the user interrupts a running invocation.
pub const INTERRUPT_EXIT_CODE: i32 = 1;

/// Name reported for a non-zero exit code that no [`ErrorKind`] claims.
pub const UNKNOWN_EXIT_CODE_NAME: &str = "UnknownExitCodeError";

/// Anticipated failures of the reproduction tool. Each has a stable name and
/// its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MinimizationNotFinished,
    SanitizerNotProvided,
    ClusterFuzz,
    PermissionsTooPermissive,
    GomaNotInstalled,
    JobTypeNotSupported,
    NotInstalled,
    GsutilNotInstalled,
    BadJobTypeDefinition,
    Unreproducible,
    DirtyRepo,
    CommandFailed,
    /// Generic expected failure; the caller chooses the exit code.
    Expected { code: i32 },
}

/// Every kind with a fixed code, in code order.
const CLASSIFIED: &[ErrorKind] = &[
    ErrorKind::MinimizationNotFinished,
    ErrorKind::SanitizerNotProvided,
    ErrorKind::ClusterFuzz,
    ErrorKind::PermissionsTooPermissive,
    ErrorKind::GomaNotInstalled,
    ErrorKind::JobTypeNotSupported,
    ErrorKind::NotInstalled,
    ErrorKind::GsutilNotInstalled,
    ErrorKind::BadJobTypeDefinition,
    ErrorKind::Unreproducible,
    ErrorKind::DirtyRepo,
    ErrorKind::CommandFailed,
];

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::MinimizationNotFinished => "MinimizationNotFinishedError",
            ErrorKind::SanitizerNotProvided => "SanitizerNotProvidedError",
            ErrorKind::ClusterFuzz => "ClusterFuzzError",
            ErrorKind::PermissionsTooPermissive => "PermissionsTooPermissiveError",
            ErrorKind::GomaNotInstalled => "GomaNotInstalledError",
            ErrorKind::JobTypeNotSupported => "JobTypeNotSupportedError",
            ErrorKind::NotInstalled => "NotInstalledError",
            ErrorKind::GsutilNotInstalled => "GsutilNotInstalledError",
            ErrorKind::BadJobTypeDefinition => "BadJobTypeDefinitionError",
            ErrorKind::Unreproducible => "UnreproducibleError",
            ErrorKind::DirtyRepo => "DirtyRepoError",
            ErrorKind::CommandFailed => "CommandFailedError",
            ErrorKind::Expected { .. } => "ExpectedException",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::MinimizationNotFinished => 42,
            ErrorKind::SanitizerNotProvided => 43,
            ErrorKind::ClusterFuzz => 44,
            ErrorKind::PermissionsTooPermissive => 45,
            ErrorKind::GomaNotInstalled => 46,
            ErrorKind::JobTypeNotSupported => 47,
            ErrorKind::NotInstalled => 48,
            ErrorKind::GsutilNotInstalled => 49,
            ErrorKind::BadJobTypeDefinition => 50,
            ErrorKind::Unreproducible => 51,
            ErrorKind::DirtyRepo => 52,
            ErrorKind::CommandFailed => 53,
            ErrorKind::Expected { code } => *code,
        }
    }

    /// Reverse lookup over the fixed-code kinds.
    pub fn from_exit_code(code: i32) -> Option<Self> {
        CLASSIFIED.iter().copied().find(|kind| kind.exit_code() == code)
    }

    fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::MinimizationNotFinished => "The testcase hasn't been minimized yet.",
            ErrorKind::SanitizerNotProvided => "The testcase doesn't specify a sanitizer.",
            ErrorKind::ClusterFuzz => "ClusterFuzz returned an error.",
            ErrorKind::PermissionsTooPermissive => "Credential file permissions are too permissive.",
            ErrorKind::GomaNotInstalled => "goma is not installed.",
            ErrorKind::JobTypeNotSupported => "The job type is not supported.",
            ErrorKind::NotInstalled => "A required binary is not installed.",
            ErrorKind::GsutilNotInstalled => "gsutil is not installed.",
            ErrorKind::BadJobTypeDefinition => "The job type definition is invalid.",
            ErrorKind::Unreproducible => "The testcase could not be reproduced.",
            ErrorKind::DirtyRepo => "The source checkout has uncommitted changes.",
            ErrorKind::CommandFailed => "A command failed to run.",
            ErrorKind::Expected { .. } => "An expected error occurred.",
        }
    }
}

/// Class name for a process return code, as reported by CI runs.
pub fn class_name_for_exit_code(code: i32) -> &'static str {
    ErrorKind::from_exit_code(code)
        .map(|kind| kind.name())
        .unwrap_or(UNKNOWN_EXIT_CODE_NAME)
}

/// A classified failure raised by a wrapped command.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ExpectedError {
    pub kind: ErrorKind,
    pub message: String,
    /// Fields attached to the failure event under `exception_extras`.
    pub extras: Map<String, Value>,
}

impl ExpectedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            extras: Map::new(),
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

/// Caller broke the calling convention. Raised before any event is emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("Invoking {0} with positional arguments is not allowed.")]
    PositionalArguments(String),
    #[error("Invocation of {0} has already run.")]
    AlreadyRun(String),
    #[error("Failed to capture arguments of {command}: {reason}")]
    Unserializable { command: String, reason: String },
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error("{}: {}", .0.kind.name(), .0.message)]
    Expected(ExpectedError),
    #[error("Interrupted by user")]
    Interrupted,
    #[error(transparent)]
    Unclassified(anyhow::Error),
}

impl InvocationError {
    /// Code the process must exit with, or `None` when the error propagates.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            InvocationError::Expected(err) => Some(err.exit_code()),
            InvocationError::Interrupted => Some(INTERRUPT_EXIT_CODE),
            InvocationError::Usage(_) | InvocationError::Unclassified(_) => None,
        }
    }
}
