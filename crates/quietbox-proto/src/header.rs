//! Hybrid envelope header with zero-copy parsing.
//!
//! The header is written in front of every hybrid envelope and is also the
//! associated data of the envelope's AEAD step, so tampering with any of its
//! bytes invalidates the ciphertext.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Fixed 10-byte hybrid envelope header (Big Endian).
///
/// All bit patterns are valid for the struct itself; semantic validation of
/// the version and algorithm bytes happens in [`HybridHeader::parse`].
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct HybridHeader {
    version: u8,
    algorithm: u8,
    sequence: [u8; 4],        // u32 replay counter chosen by the sender
    wrapped_key_len: [u8; 4], // u32 length of the RSA-wrapped one-time key
}

impl HybridHeader {
    /// Size of the serialized header
    pub const SIZE: usize = 10;

    /// First (and only) envelope version
    pub const VERSION_1: u8 = 0x00;

    /// RSA-OAEP(SHA-256) key wrap + `XChaCha20-Poly1305` payload
    pub const ALGORITHM_RSA_OAEP_XCHACHA20: u8 = 0x00;

    /// Build a header from its fields.
    #[must_use]
    pub fn new(version: u8, algorithm: u8, sequence: u32, wrapped_key_len: u32) -> Self {
        Self {
            version,
            algorithm,
            sequence: sequence.to_be_bytes(),
            wrapped_key_len: wrapped_key_len.to_be_bytes(),
        }
    }

    /// Parse the header at the start of `bytes`, returning it together with
    /// the remaining body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MessageTooShort` if fewer than 10 bytes are supplied
    /// - `ProtocolError::UnsupportedVersion` for an unknown version byte
    /// - `ProtocolError::UnsupportedAlgorithm` for an unknown algorithm byte
    ///
    /// The wrapped-key length is not checked against the body here; the
    /// envelope layer treats an inconsistent length as an authentication
    /// failure.
    pub fn parse(bytes: &[u8]) -> Result<(&Self, &[u8])> {
        let (header, rest) = Self::ref_from_prefix(bytes).map_err(|_| {
            ProtocolError::MessageTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;

        if header.version != Self::VERSION_1 {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        if header.algorithm != Self::ALGORITHM_RSA_OAEP_XCHACHA20 {
            return Err(ProtocolError::UnsupportedAlgorithm(header.algorithm));
        }

        Ok((header, rest))
    }

    /// Serialize header to bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(IntoBytes::as_bytes(self));
        out
    }

    /// Envelope version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Algorithm identifier byte.
    #[must_use]
    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }

    /// Sender-chosen sequence number.
    #[must_use]
    pub fn sequence(&self) -> u32 {
        u32::from_be_bytes(self.sequence)
    }

    /// Length of the wrapped one-time key that follows the header.
    #[must_use]
    pub fn wrapped_key_len(&self) -> u32 {
        u32::from_be_bytes(self.wrapped_key_len)
    }
}

impl fmt::Debug for HybridHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridHeader")
            .field("version", &self.version())
            .field("algorithm", &self.algorithm())
            .field("sequence", &self.sequence())
            .field("wrapped_key_len", &self.wrapped_key_len())
            .finish()
    }
}

impl PartialEq for HybridHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for HybridHeader {}
