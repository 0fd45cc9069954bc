//! Error types for scene cache operations.

use thiserror::Error;

/// Main error type for scene cache operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Location, child, attribute or link target does not exist
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// Malformed path, out-of-order or invalid sample time, bad open mode
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Container data could not be decoded
    #[error("Corrupted scene container: {0}")]
    Corrupted(String),

    /// The shared scene cache cannot hold another entry
    #[error("Scene cache capacity exceeded: {pinned} scenes in use, maximum is {max}")]
    Capacity { pinned: usize, max: usize },

    /// Write attempted on a container opened for reading
    #[error("Scene is read-only: {0}")]
    ReadOnly(String),

    /// Container was already closed
    #[error("Scene container is closed: {0}")]
    Closed(String),

    /// Stored value does not have the requested type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Sample index out of bounds
    #[error("Sample index {index} out of bounds (count: {count})")]
    SampleOutOfBounds { index: usize, count: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by callers deciding between retry and abort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    PathNotFound,
    InvalidArgument,
    Io,
    Capacity,
}

impl Error {
    /// Create a path-not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::PathNotFound(msg.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a corrupted-container error.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathNotFound(_) => ErrorKind::PathNotFound,
            Self::InvalidArgument(_)
            | Self::ReadOnly(_)
            | Self::TypeMismatch { .. }
            | Self::SampleOutOfBounds { .. } => ErrorKind::InvalidArgument,
            Self::Corrupted(_) | Self::Closed(_) | Self::Io(_) => ErrorKind::Io,
            Self::Capacity { .. } => ErrorKind::Capacity,
        }
    }
}

/// Result type alias for scene cache operations.
pub type Result<T> = std::result::Result<T, Error>;
