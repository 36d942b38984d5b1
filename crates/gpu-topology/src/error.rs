//! Error types for gpu-topology

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while querying the device topology
#[derive(Error, Debug)]
pub enum TopologyError {
    /// The kernel driver is not loaded (its procfs tree is missing)
    #[error("driver not loaded: {0} does not exist")]
    DriverNotLoaded(PathBuf),

    /// A query was issued outside of an open session
    #[error("device library used before init or after shutdown")]
    NotInitialized,

    /// Initialisation was refused by the backend
    #[error("failed to initialize device library: {0}")]
    InitFailed(String),

    /// A topology entry could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A topology entry was readable but not in the expected format
    #[error("malformed entry {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// A query failed for a backend-specific reason
    #[error("query failed: {0}")]
    Query(String),
}

impl TopologyError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TopologyError::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TopologyError::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_names_path() {
        let err = TopologyError::read(
            "/proc/driver/nvidia/version",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("/proc/driver/nvidia/version"));
    }

    #[test]
    fn test_malformed_error_display() {
        let err = TopologyError::malformed("/x/access", "missing DeviceFileMinor");
        let msg = err.to_string();
        assert!(msg.contains("/x/access"));
        assert!(msg.contains("missing DeviceFileMinor"));
    }
}
