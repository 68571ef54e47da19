//! Data-block sealing.
//!
//! Content is encrypted under the one-time content key carried in a
//! key-block. The random nonce is prepended to the ciphertext and the content
//! identifier is bound as associated data, so a data-block copied to another
//! identifier no longer opens.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use quietbox_proto::{Identifier, ProtocolError};

use crate::{KEY_SIZE, error::CryptoError, secret::Secret};

/// Size of the random nonce prefix.
pub const CONTENT_NONCE_SIZE: usize = 24;

const TAG_SIZE: usize = 16;

/// Seal `plaintext` for storage under `identifier`.
///
/// Output is `nonce ‖ ciphertext ‖ tag`. The caller supplies a fresh random
/// nonce for every call.
pub fn seal_content(
    plaintext: &[u8],
    key: &Secret<KEY_SIZE>,
    identifier: &Identifier,
    nonce: [u8; CONTENT_NONCE_SIZE],
) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let payload = Payload { msg: plaintext, aad: identifier.as_bytes() };

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), payload) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut sealed = Vec::with_capacity(CONTENT_NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    sealed
}

/// Open a data-block fetched from `identifier`.
///
/// # Errors
///
/// - `Format` if `sealed` is shorter than nonce plus tag
/// - `AuthenticationFailed` on any tag mismatch
pub fn open_content(
    sealed: &[u8],
    key: &Secret<KEY_SIZE>,
    identifier: &Identifier,
) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < CONTENT_NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Format(ProtocolError::MessageTooShort {
            expected: CONTENT_NONCE_SIZE + TAG_SIZE,
            actual: sealed.len(),
        }));
    }

    let (nonce, ciphertext) = sealed.split_at(CONTENT_NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad: identifier.as_bytes() })
        .map_err(|_| CryptoError::AuthenticationFailed)
}
