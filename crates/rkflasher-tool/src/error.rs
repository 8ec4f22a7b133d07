//! Error types for rkflasher-tool

use std::io;
use std::time::Duration;

use rkflasher_core::backend::BackendError;
use thiserror::Error;

/// Errors from running rkdeveloptool commands
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool binary could not be found
    #[error("rkdeveloptool not found: {0}")]
    NotFound(String),

    /// The tool could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// I/O error (temporary files, reading output)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A bounded command did not finish in time
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// Another command is still running on this runner
    #[error("command already running")]
    Busy,

    /// The tool exited with a non-zero code
    #[error("command failed with exit code {code}")]
    CommandFailed {
        /// Exit code
        code: i32,
        /// Combined output of the failed command
        output: String,
    },

    /// A precondition failed before anything was started
    #[error("{0}")]
    Precondition(String),

    /// The command was cancelled
    #[error("command cancelled")]
    Cancelled,

    /// The backend specification named no known backend
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// Invalid backend parameter
    #[error("invalid backend parameter: {0}")]
    InvalidParam(String),

    /// Parsing or lookup error from rkflasher-core
    #[error(transparent)]
    Core(#[from] rkflasher_core::Error),
}

impl From<BackendError> for ToolError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(what) => Self::NotFound(what),
            BackendError::Spawn { program, source } => Self::Spawn { program, source },
            BackendError::Io(e) => Self::Io(e),
            BackendError::Timeout(after) => Self::Timeout(after),
            BackendError::Cancelled => Self::Cancelled,
        }
    }
}

/// Result type alias using ToolError
pub type Result<T> = std::result::Result<T, ToolError>;
