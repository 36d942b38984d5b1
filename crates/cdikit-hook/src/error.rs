//! Error types for cdikit-hook

use std::path::PathBuf;

use thiserror::Error;

/// Failures of a known hook operation.
#[derive(Error, Debug)]
pub enum HookError {
    /// A hook argument could not be parsed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The container root could not be determined
    #[error("invalid container state: {0}")]
    ContainerState(String),

    /// A container path would resolve outside the container root
    #[error("path {0} escapes the container root")]
    PathEscape(String),

    /// Following the symlinks along a container path did not terminate
    #[error("too many levels of symbolic links resolving {0}")]
    TooManyLinks(String),

    /// A file is in the way of the entry the hook creates
    #[error("{path} already exists: {reason}")]
    Conflict { path: PathBuf, reason: String },

    /// A filesystem operation failed
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external program exited unsuccessfully
    #[error("{program} failed: {status}")]
    Command { program: String, status: String },
}

impl HookError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HookError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
