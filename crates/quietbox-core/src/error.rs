//! Error types for the protocol core.
//!
//! Callers branch on the variant: transport failures are retried, protocol
//! and authentication failures end the exchange, format errors point at the
//! caller's input.

use std::io;

use quietbox_crypto::CryptoError;
use thiserror::Error;

use crate::{persistence::PersistenceError, store::StoreError};

/// Errors surfaced by enrollment, publishing and synchronization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No connection or a socket error; retry at a higher layer
    #[error("transport unavailable: {reason}")]
    TransportUnavailable {
        /// Underlying failure
        reason: String,
    },

    /// The peer returned something the state machine did not expect
    #[error("protocol violation: {reason}")]
    ProtocolViolation {
        /// What was unexpected
        reason: String,
    },

    /// Tag mismatch, failed key unwrap, rejected replay or revocation check
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Wrong-length key, identifier or header; nothing was attempted
    #[error("format error: {reason}")]
    Format {
        /// Which input was malformed
        reason: String,
    },

    /// The persistence collaborator failed
    #[error(transparent)]
    Storage(#[from] PersistenceError),
}

impl CoreError {
    /// Whether a higher layer may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportUnavailable { .. })
    }

    /// Protocol violation with a reason.
    pub(crate) fn violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation { reason: reason.into() }
    }
}

impl From<CryptoError> for CoreError {
    fn from(err: CryptoError) -> Self {
        if err.is_authentication_failure() {
            return Self::AuthenticationFailed;
        }

        match err {
            CryptoError::AlreadyAgreed | CryptoError::NotReady => Self::violation(err.to_string()),
            other => Self::Format { reason: other.to_string() },
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoConnection { reason } => Self::TransportUnavailable { reason },
            StoreError::AuthFailed => Self::AuthenticationFailed,
            StoreError::BadKeyFormat => Self::Format { reason: "server rejected key format".into() },
            StoreError::KeyTaken | StoreError::ProtocolError { .. } => Self::violation(err.to_string()),
        }
    }
}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        Self::TransportUnavailable { reason: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(CoreError::TransportUnavailable { reason: "reset".into() }.is_retryable());
        assert!(!CoreError::AuthenticationFailed.is_retryable());
        assert!(!CoreError::violation("x").is_retryable());
    }

    #[test]
    fn crypto_errors_map_into_taxonomy() {
        assert_eq!(CoreError::from(CryptoError::AuthenticationFailed), CoreError::AuthenticationFailed);
        assert_eq!(
            CoreError::from(CryptoError::SequenceMismatch { expected: 1, actual: 2 }),
            CoreError::AuthenticationFailed
        );
        assert!(matches!(
            CoreError::from(CryptoError::UnsupportedVersion(4)),
            CoreError::Format { .. }
        ));
        assert!(matches!(CoreError::from(CryptoError::NotReady), CoreError::ProtocolViolation { .. }));
    }

    #[test]
    fn store_errors_map_into_taxonomy() {
        let err = CoreError::from(StoreError::NoConnection { reason: "refused".into() });
        assert!(err.is_retryable());
        assert_eq!(CoreError::from(StoreError::AuthFailed), CoreError::AuthenticationFailed);
        assert!(matches!(CoreError::from(StoreError::KeyTaken), CoreError::ProtocolViolation { .. }));
    }
}
