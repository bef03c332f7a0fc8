//! Error types for sandbox lifecycle operations.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for sandbox operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The sandbox name does not match `[A-Za-z0-9_-]+`.
    #[error("invalid sandbox name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// The project source cannot be turned into a project name.
    #[error("invalid project source '{value}': {reason}")]
    InvalidProjectSource { value: String, reason: String },

    /// A sandbox with this name is already registered.
    #[error("sandbox '{0}' already exists; use a different name or remove the existing sandbox first")]
    SandboxExists(String),

    /// No sandbox with this name is registered.
    #[error("sandbox '{0}' not found; use 'list' to see available sandboxes")]
    SandboxNotFound(String),

    /// A git step exited non-zero, timed out, or could not be started.
    #[error("git operation failed: {operation}: {detail}")]
    Git { operation: String, detail: String },

    /// A non-git external command (the bootstrap step) failed.
    #[error("command '{program}' failed: {detail}")]
    Command { program: String, detail: String },

    /// The registry file exists but cannot be used.
    #[error("state file {path} is corrupt: {reason}")]
    StateFile { path: PathBuf, reason: String },

    /// The registry was written by a newer, unknown format version.
    #[error("state file {path} has unsupported version '{version}'")]
    UnsupportedStateVersion { path: PathBuf, version: String },

    /// Creating, writing, or removing something on disk failed.
    #[error("failed to {operation} {path}: {source}")]
    Filesystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error without a more specific context.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file or environment override is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Creation failed and removing the partial sandbox failed as well.
    #[error("{source} (cleanup also failed: {cleanup})")]
    CleanupFailed {
        #[source]
        source: Box<Error>,
        cleanup: String,
    },
}

impl Error {
    /// Wraps an IO error with the path and the operation that failed.
    pub fn filesystem(path: impl Into<PathBuf>, operation: &str, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            operation: operation.to_string(),
            source,
        }
    }

    /// Returns the failure category reported to the user.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidName { .. } | Error::InvalidProjectSource { .. } | Error::Config(_) => {
                ErrorKind::InvalidInput
            }
            Error::SandboxExists(_) => ErrorKind::SandboxExists,
            Error::SandboxNotFound(_) => ErrorKind::SandboxNotFound,
            Error::Git { .. } => ErrorKind::GitOperationFailed,
            Error::Command { .. } => ErrorKind::ExternalCommandFailed,
            Error::StateFile { .. } | Error::UnsupportedStateVersion { .. } => {
                ErrorKind::StateFileCorrupt
            }
            Error::Filesystem { .. } | Error::Io(_) => ErrorKind::FilesystemFailed,
            Error::CleanupFailed { source, .. } => source.kind(),
        }
    }
}

/// Failure categories shown by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    SandboxExists,
    SandboxNotFound,
    GitOperationFailed,
    ExternalCommandFailed,
    StateFileCorrupt,
    FilesystemFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::SandboxExists => "SandboxExists",
            ErrorKind::SandboxNotFound => "SandboxNotFound",
            ErrorKind::GitOperationFailed => "GitOperationFailed",
            ErrorKind::ExternalCommandFailed => "ExternalCommandFailed",
            ErrorKind::StateFileCorrupt => "StateFileCorrupt",
            ErrorKind::FilesystemFailed => "FilesystemFailed",
        };
        f.write_str(name)
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, Error>;
