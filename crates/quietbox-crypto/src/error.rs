//! Error types for the cryptographic layer.

use quietbox_proto::ProtocolError;
use thiserror::Error;

/// Errors from key agreement, envelopes and key-set handling.
///
/// Authentication failures carry no detail about which check
/// failed; callers must not forward the distinction to a network peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A partner value was already accepted; call `reset` first
    #[error("key agreement already completed")]
    AlreadyAgreed,

    /// The shared secret was requested before a partner value was accepted
    #[error("key agreement has no partner value yet")]
    NotReady,

    /// The partner's public value cannot be used
    #[error("invalid peer public key: {reason}")]
    InvalidPeerKey {
        /// Why the key was rejected
        reason: &'static str,
    },

    /// AEAD tag mismatch, failed key unwrap or inconsistent envelope lengths
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The hybrid envelope carries a different sequence number than expected
    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Sequence number the caller expected
        expected: u32,
        /// Sequence number found in the header
        actual: u32,
    },

    /// Hybrid envelope version is not supported
    #[error("unsupported envelope version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// Hybrid envelope algorithm is not supported
    #[error("unsupported envelope algorithm: {0:#04x}")]
    UnsupportedAlgorithm(u8),

    /// Input has the wrong shape; no primitive was invoked
    #[error("malformed input: {0}")]
    Format(ProtocolError),

    /// The one-time key could not be wrapped for the recipient
    #[error("key wrap failed: {reason}")]
    KeyWrap {
        /// Underlying failure
        reason: String,
    },

    /// Asymmetric key generation or (de)serialization failed
    #[error("asymmetric key error: {reason}")]
    AsymmetricKey {
        /// Underlying failure
        reason: String,
    },
}

impl CryptoError {
    /// Whether the error means "this ciphertext is not valid for us".
    ///
    /// Sequence mismatches count as authentication failures: they reject a
    /// replayed or misdirected envelope.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::SequenceMismatch { .. })
    }

    /// Whether the error was raised before any cryptographic operation.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Format(_) | Self::UnsupportedVersion(_) | Self::UnsupportedAlgorithm(_))
    }
}

impl From<ProtocolError> for CryptoError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnsupportedVersion(v) => Self::UnsupportedVersion(v),
            ProtocolError::UnsupportedAlgorithm(a) => Self::UnsupportedAlgorithm(a),
            other => Self::Format(other),
        }
    }
}
