//! Protocol error types.

use thiserror::Error;

/// Result alias for wire-level operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while parsing or producing wire data.
///
/// All of these are format errors: they are detected before any
/// cryptographic primitive sees the bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than the fixed structure being parsed
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// A fixed-length field had the wrong length
    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Name of the field
        what: &'static str,
        /// Required length
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Hybrid envelope version byte is not understood
    #[error("unsupported envelope version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// Hybrid envelope algorithm byte is not understood
    #[error("unsupported envelope algorithm: {0:#04x}")]
    UnsupportedAlgorithm(u8),

    /// Encoded message exceeds the protocol limit
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Size of the rejected message
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// CBOR serialization failed
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),
}
