//! Server error types.

use std::fmt;

use crate::storage::StorageError;

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, etc.).
    ///
    /// Fatal: prevents server startup.
    Config(String),

    /// Transport/network error (accept failure, socket I/O).
    ///
    /// Fatal for the affected connection only.
    Transport(String),

    /// A client sent a frame that violates the framing rules, or a reply
    /// could not be encoded.
    ///
    /// The connection is closed; other clients are unaffected.
    Protocol(String),

    /// Storage backend failed outside a request (e.g. during startup checks).
    Storage(StorageError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
