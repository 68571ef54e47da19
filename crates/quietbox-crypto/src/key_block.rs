//! Direct symmetric envelope for key-blocks.
//!
//! A key-block carries `content_key ‖ content_identifier` (64 bytes) from one
//! relationship party to the other. It is sealed under the sender's outbound
//! key with a nonce derived from the sender's outbound counter; the receiver
//! opens it with its inbound key and inbound counter. A receiver whose counter
//! points at a different slot derives a different nonce, so the tag check
//! doubles as a check that the block belongs to the expected identifier.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use quietbox_proto::{Identifier, ProtocolError, TOKEN_SIZE};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{
    KEY_SIZE,
    error::CryptoError,
    keyset::{Counter, Direction, KeySet},
    secret::Secret,
};

/// Nonce size of `XChaCha20-Poly1305`.
pub const KEY_BLOCK_NONCE_SIZE: usize = 24;

/// Plaintext size: content key followed by content identifier.
pub const KEY_BLOCK_PLAINTEXT_SIZE: usize = KEY_SIZE + TOKEN_SIZE;

/// Sealed size: plaintext plus the Poly1305 tag.
pub const SEALED_KEY_BLOCK_SIZE: usize = KEY_BLOCK_PLAINTEXT_SIZE + 16;

const NONCE_LABEL: &[u8] = b"quietbox/key-block-nonce/v1";
const KEY_BLOCK_AAD: &[u8] = b"quietbox/key-block/v1";

/// Pointer from a mailbox slot to a data-block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBlock {
    /// Key that decrypts the data-block
    pub content_key: Secret<KEY_SIZE>,
    /// Identifier the data-block is stored under
    pub content_identifier: Identifier,
}

/// Nonce for the key-block at `counter`.
///
/// `SHA-256(label ‖ counter)` truncated to the cipher's nonce size. The
/// truncation is from a 32-byte digest to a fixed 24 bytes, never dependent on
/// input length.
pub fn key_block_nonce(counter: &Counter) -> [u8; KEY_BLOCK_NONCE_SIZE] {
    let digest = Sha256::new().chain_update(NONCE_LABEL).chain_update(counter.as_bytes()).finalize();

    let mut nonce = [0u8; KEY_BLOCK_NONCE_SIZE];
    nonce.copy_from_slice(&digest[..KEY_BLOCK_NONCE_SIZE]);
    nonce
}

/// Seal a key-block for the current outbound slot.
///
/// Sealing the same block twice at the same counter yields the same bytes.
/// Callers must advance the outbound counter once a block for that slot has
/// been stored, and never store two different blocks for one slot.
pub fn seal_key_block(block: &KeyBlock, key_set: &KeySet) -> Vec<u8> {
    let mut plaintext = Zeroizing::new([0u8; KEY_BLOCK_PLAINTEXT_SIZE]);
    plaintext[..KEY_SIZE].copy_from_slice(block.content_key.as_bytes());
    plaintext[KEY_SIZE..].copy_from_slice(block.content_identifier.as_bytes());

    let nonce = key_block_nonce(key_set.counter(Direction::Outbound));
    let cipher = XChaCha20Poly1305::new(key_set.key(Direction::Outbound).as_bytes().into());

    let payload = Payload { msg: plaintext.as_slice(), aad: KEY_BLOCK_AAD };
    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), payload) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    ciphertext
}

/// Open a key-block found at the current inbound slot.
///
/// # Errors
///
/// - `Format` if `sealed` is not exactly [`SEALED_KEY_BLOCK_SIZE`] bytes
/// - `AuthenticationFailed` if the tag does not verify under the inbound key
///   and counter
pub fn open_key_block(sealed: &[u8], key_set: &KeySet) -> Result<KeyBlock, CryptoError> {
    if sealed.len() != SEALED_KEY_BLOCK_SIZE {
        return Err(CryptoError::Format(ProtocolError::InvalidLength {
            what: "key-block",
            expected: SEALED_KEY_BLOCK_SIZE,
            actual: sealed.len(),
        }));
    }

    let nonce = key_block_nonce(key_set.counter(Direction::Inbound));
    let cipher = XChaCha20Poly1305::new(key_set.key(Direction::Inbound).as_bytes().into());

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(XNonce::from_slice(&nonce), Payload { msg: sealed, aad: KEY_BLOCK_AAD })
            .map_err(|_| CryptoError::AuthenticationFailed)?,
    );

    let mut content_key = [0u8; KEY_SIZE];
    content_key.copy_from_slice(&plaintext[..KEY_SIZE]);
    let content_identifier = Identifier::from_slice(&plaintext[KEY_SIZE..])?;

    Ok(KeyBlock { content_key: Secret::from_bytes(content_key), content_identifier })
}
