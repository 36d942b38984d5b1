//! Error taxonomy for spec generation.
//!
//! Every variant is fatal to a generation run; nothing here is retried.

use gpu_topology::TopologyError;

/// cdikit generation errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A discoverer could not enumerate an entity.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// An entity produced by a discoverer is malformed.
    #[error("invalid container edits: {0}")]
    Composition(String),

    /// Encoding or transcoding the specification failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A caller-supplied value was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// An error annotated with the step (device, discoverer, path) it came from.
    #[error("{context}: {error}")]
    Context { context: String, error: Box<Error> },
}

impl Error {
    /// Wrap `self` with a description of the failing step.
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            error: Box::new(self),
        }
    }

    /// The innermost error, past any context wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { error, .. } => error.root(),
            other => other,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for cdikit operations.
pub type Result<T> = std::result::Result<T, Error>;
