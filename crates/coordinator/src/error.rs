//! Coordination errors

use thiserror::Error;

use voltrace_storage::StorageError;

/// Coordination result type
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Errors surfaced by coordinator backends
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A collective operation failed on the backend
    #[error("collective failed for report {report}: {message}")]
    Collective {
        /// Report whose communicator the operation ran on
        report: String,
        /// Backend failure description
        message: String,
    },

    /// Spike ordering string not recognized
    #[error("unknown spike order: {order}")]
    UnknownSpikeOrder {
        /// The rejected ordering string
        order: String,
    },

    /// Container failure during a collective open or write
    #[error(transparent)]
    Storage(#[from] StorageError),
}
