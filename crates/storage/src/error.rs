//! Storage errors

use thiserror::Error;

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by container writers
#[derive(Debug, Error)]
pub enum StorageError {
    /// Write or configuration attempted on a closed container
    #[error("container closed: {path}")]
    Closed {
        /// Path of the dataset or group the caller addressed
        path: String,
    },

    /// Dataset addressed before it was configured
    #[error("dataset not found: {path}")]
    NotFound {
        /// Path of the missing dataset
        path: String,
    },

    /// Appended row width disagrees with the configured dataset
    #[error("shape mismatch at {path}: expected {expected} columns, got {got}")]
    ShapeMismatch {
        /// Path of the dataset
        path: String,
        /// Column count the dataset was configured with
        expected: u64,
        /// Column count of the rejected write
        got: u64,
    },

    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
