//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend refused the value
    #[error("capacity exceeded: limit of {limit} values")]
    CapacityExceeded {
        /// Configured maximum number of values
        limit: usize,
    },

    /// I/O error in the backend
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
