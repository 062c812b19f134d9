//! Error types for UDF driver operations

use thiserror::Error;

/// Result type for UDF driver operations
pub type Result<T> = std::result::Result<T, UdfError>;

/// Errors surfaced by the UDF driver core
///
/// The taxonomy is deliberately small: device failures propagate untouched,
/// structural violations are terminal for the operation in progress and are
/// never retried, and `NotFound` is routine rather than exceptional.
#[derive(Error, Debug)]
pub enum UdfError {
    /// Device read failure, propagated from the block device untouched
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A structural invariant of the on-disk format failed
    #[error("volume corrupted: {0}")]
    VolumeCorrupted(&'static str),

    /// A recognized but unimplemented on-disk feature
    #[error("unsupported feature: {0}")]
    Unsupported(&'static str),

    /// Path component absent
    #[error("no such file or directory")]
    NotFound,

    /// Symbolic link chain exceeded the resolution bound
    #[error("too many levels of symbolic links")]
    TooManySymlinks,
}

impl UdfError {
    /// Whether this is the routine path-lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
