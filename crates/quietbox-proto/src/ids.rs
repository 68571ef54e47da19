//! Pseudonymous identifiers and revocation tokens.
//!
//! The server indexes stored blobs by [`Identifier`] and deletes one only when
//! presented with the matching [`RevocationToken`]. The identifier is a one-way
//! hash of the token, so holding the full server state never reveals which
//! token authorizes which deletion.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Length of identifiers and revocation tokens (SHA-256 output size).
pub const TOKEN_SIZE: usize = 32;

/// Server-visible lookup key for one stored blob.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(#[serde(with = "serde_bytes")] [u8; TOKEN_SIZE]);

impl Identifier {
    /// Wrap raw identifier bytes.
    pub const fn from_bytes(bytes: [u8; TOKEN_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse an identifier from an untrusted slice.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidLength` unless `bytes` is exactly
    /// [`TOKEN_SIZE`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        to_array("identifier", bytes).map(Self)
    }

    /// Raw identifier bytes.
    pub const fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
        &self.0
    }

    /// First four bytes as hex, for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({}..)", self.short_hex())
    }
}

impl AsRef<[u8]> for Identifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Secret preimage of an [`Identifier`]; authorizes deletion.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevocationToken(#[serde(with = "serde_bytes")] [u8; TOKEN_SIZE]);

impl RevocationToken {
    /// Wrap raw token bytes.
    pub const fn from_bytes(bytes: [u8; TOKEN_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a revocation token from an untrusted slice.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidLength` unless `bytes` is exactly
    /// [`TOKEN_SIZE`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        to_array("revocation token", bytes).map(Self)
    }

    /// Raw token bytes.
    pub const fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
        &self.0
    }
}

impl fmt::Debug for RevocationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RevocationToken(<redacted>)")
    }
}

impl AsRef<[u8]> for RevocationToken {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An `(identifier, revocation token)` pair.
///
/// Produced on demand from key-set state or from fresh randomness; never
/// stored on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    /// Lookup key presented to the server
    pub identifier: Identifier,
    /// Preimage of `identifier`
    pub revocation: RevocationToken,
}

impl TokenPair {
    /// Combine an identifier with its revocation token.
    ///
    /// The caller is responsible for `identifier` actually being the hash of
    /// `revocation`.
    pub const fn new(identifier: Identifier, revocation: RevocationToken) -> Self {
        Self { identifier, revocation }
    }
}

fn to_array(what: &'static str, bytes: &[u8]) -> Result<[u8; TOKEN_SIZE]> {
    <[u8; TOKEN_SIZE]>::try_from(bytes).map_err(|_| ProtocolError::InvalidLength {
        what,
        expected: TOKEN_SIZE,
        actual: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rejects_wrong_length() {
        let err = Identifier::from_slice(&[0u8; 31]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidLength { what: "identifier", expected: 32, actual: 31 }
        );

        assert!(Identifier::from_slice(&[0u8; 33]).is_err());
        assert!(Identifier::from_slice(&[]).is_err());
    }

    #[test]
    fn revocation_token_debug_is_redacted() {
        let token = RevocationToken::from_bytes([0xAB; TOKEN_SIZE]);
        let rendered = format!("{token:?}");

        assert!(!rendered.contains("ab"));
        assert!(!rendered.contains("171"));
    }

    #[test]
    fn identifier_debug_shows_prefix_only() {
        let id = Identifier::from_bytes([0x0F; TOKEN_SIZE]);
        assert_eq!(format!("{id:?}"), "Identifier(0f0f0f0f..)");
    }
}
