//! Hybrid envelope: RSA-OAEP wrapped one-time key + `XChaCha20-Poly1305`.
//!
//! Used for payloads sent to a long-term identified recipient that shares no
//! key set with the sender yet, such as a study join request.
//!
//! ```text
//! header (10) ‖ wrapped one-time key (header.wrapped_key_len) ‖ nonce (24) ‖ ciphertext ‖ tag
//! ```
//!
//! The header is built before the symmetric step and authenticated as AAD.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use quietbox_proto::HybridHeader;
use rand::{CryptoRng, RngCore};
use rsa::{
    Oaep, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePublicKey, EncodePublicKey},
};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{KEY_SIZE, error::CryptoError};

/// Smallest modulus accepted by [`generate_keypair`].
pub const MIN_RSA_BITS: usize = 1024;

/// Modulus size for production study keys.
pub const DEFAULT_RSA_BITS: usize = 2048;

const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;

/// Generate a recipient key pair.
///
/// # Errors
///
/// `AsymmetricKey` if `bits` is below [`MIN_RSA_BITS`] or generation fails.
pub fn generate_keypair<R: RngCore + CryptoRng>(
    rng: &mut R,
    bits: usize,
) -> Result<RsaPrivateKey, CryptoError> {
    if bits < MIN_RSA_BITS {
        return Err(CryptoError::AsymmetricKey {
            reason: format!("modulus of {bits} bits is below the minimum of {MIN_RSA_BITS}"),
        });
    }

    RsaPrivateKey::new(rng, bits).map_err(|e| CryptoError::AsymmetricKey { reason: e.to_string() })
}

/// DER (SPKI) encoding of a public key, for publishing.
pub fn public_key_to_der(key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    key.to_public_key_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| CryptoError::AsymmetricKey { reason: e.to_string() })
}

/// Parse a DER (SPKI) public key.
pub fn public_key_from_der(der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_der(der)
        .map_err(|e| CryptoError::AsymmetricKey { reason: e.to_string() })
}

/// Encrypt `data` for the holder of `recipient`'s private key.
///
/// # Errors
///
/// `KeyWrap` if the recipient key is too small for OAEP-SHA256 with a 32-byte
/// payload.
pub fn encrypt_hybrid<R: RngCore + CryptoRng>(
    data: &[u8],
    recipient: &RsaPublicKey,
    sequence: u32,
    rng: &mut R,
) -> Result<Vec<u8>, CryptoError> {
    let mut one_time_key = Zeroizing::new([0u8; KEY_SIZE]);
    rng.fill_bytes(one_time_key.as_mut_slice());

    let wrapped = recipient
        .encrypt(rng, Oaep::new::<Sha256>(), one_time_key.as_slice())
        .map_err(|e| CryptoError::KeyWrap { reason: e.to_string() })?;

    let wrapped_len = u32::try_from(wrapped.len())
        .map_err(|_| CryptoError::KeyWrap { reason: "wrapped key exceeds u32".to_string() })?;
    let header = HybridHeader::new(
        HybridHeader::VERSION_1,
        HybridHeader::ALGORITHM_RSA_OAEP_XCHACHA20,
        sequence,
        wrapped_len,
    )
    .to_bytes();

    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new((&*one_time_key).into());
    let Ok(ciphertext) =
        cipher.encrypt(XNonce::from_slice(&nonce), Payload { msg: data, aad: &header })
    else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut out =
        Vec::with_capacity(HybridHeader::SIZE + wrapped.len() + NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&wrapped);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a hybrid envelope.
///
/// `expected_sequence` of `None` skips the replay check.
///
/// # Errors
///
/// - `Format` if the message is shorter than a header
/// - `UnsupportedVersion` / `UnsupportedAlgorithm` for unknown header bytes
/// - `SequenceMismatch` if the embedded sequence differs from the expected one
/// - `AuthenticationFailed` for length inconsistencies, key unwrap failure or
///   a tag mismatch. No partial plaintext is ever returned.
pub fn decrypt_hybrid(
    message: &[u8],
    private_key: &RsaPrivateKey,
    expected_sequence: Option<u32>,
) -> Result<Vec<u8>, CryptoError> {
    let (header, body) = HybridHeader::parse(message)?;

    if let Some(expected) = expected_sequence {
        let actual = header.sequence();
        if actual != expected {
            return Err(CryptoError::SequenceMismatch { expected, actual });
        }
    }

    let wrapped_len = header.wrapped_key_len() as usize;
    if body.len() < wrapped_len.saturating_add(NONCE_SIZE + TAG_SIZE) {
        return Err(CryptoError::AuthenticationFailed);
    }

    let (wrapped, rest) = body.split_at(wrapped_len);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

    let one_time_key = Zeroizing::new(
        private_key
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| CryptoError::AuthenticationFailed)?,
    );
    if one_time_key.len() != KEY_SIZE {
        return Err(CryptoError::AuthenticationFailed);
    }

    let aad = header.to_bytes();
    let cipher = XChaCha20Poly1305::new(one_time_key.as_slice().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad: &aad })
        .map_err(|_| CryptoError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn keypair(seed: u64) -> RsaPrivateKey {
        generate_keypair(&mut ChaCha20Rng::seed_from_u64(seed), MIN_RSA_BITS).unwrap()
    }

    #[test]
    fn round_trip_with_sequence_check() {
        let key = keypair(1);
        let mut rng = ChaCha20Rng::seed_from_u64(2);

        let sealed = encrypt_hybrid(b"join request", &key.to_public_key(), 7, &mut rng).unwrap();
        assert_eq!(decrypt_hybrid(&sealed, &key, Some(7)).unwrap(), b"join request");
    }

    #[test]
    fn header_is_prefix() {
        let key = keypair(1);
        let sealed =
            encrypt_hybrid(b"x", &key.to_public_key(), 1, &mut ChaCha20Rng::seed_from_u64(3))
                .unwrap();

        let (header, _) = HybridHeader::parse(&sealed).unwrap();
        assert_eq!(header.sequence(), 1);
        assert_eq!(header.wrapped_key_len(), 128);
        assert_eq!(sealed.len(), HybridHeader::SIZE + 128 + NONCE_SIZE + 1 + TAG_SIZE);
    }

    #[test]
    fn wrong_sequence_rejected() {
        let key = keypair(1);
        let sealed =
            encrypt_hybrid(b"x", &key.to_public_key(), 5, &mut ChaCha20Rng::seed_from_u64(4))
                .unwrap();

        let err = decrypt_hybrid(&sealed, &key, Some(6)).unwrap_err();
        assert_eq!(err, CryptoError::SequenceMismatch { expected: 6, actual: 5 });
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn skipped_check_accepts_any_sequence() {
        let key = keypair(1);
        let sealed = encrypt_hybrid(
            b"x",
            &key.to_public_key(),
            u32::MAX,
            &mut ChaCha20Rng::seed_from_u64(5),
        )
        .unwrap();

        assert_eq!(decrypt_hybrid(&sealed, &key, None).unwrap(), b"x");
    }

    #[test]
    fn wrong_recipient_fails() {
        let sealed = encrypt_hybrid(
            b"x",
            &keypair(1).to_public_key(),
            0,
            &mut ChaCha20Rng::seed_from_u64(6),
        )
        .unwrap();

        assert_eq!(
            decrypt_hybrid(&sealed, &keypair(9), None).unwrap_err(),
            CryptoError::AuthenticationFailed
        );
    }

    #[test]
    fn inflated_wrapped_length_fails_authentication() {
        let key = keypair(1);
        let mut sealed =
            encrypt_hybrid(b"x", &key.to_public_key(), 0, &mut ChaCha20Rng::seed_from_u64(7))
                .unwrap();
        sealed[6..10].copy_from_slice(&u32::MAX.to_be_bytes());

        assert_eq!(decrypt_hybrid(&sealed, &key, None).unwrap_err(), CryptoError::AuthenticationFailed);
    }

    #[test]
    fn truncated_message_is_format_error() {
        let err = decrypt_hybrid(&[0u8; 4], &keypair(1), None).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn small_modulus_refused() {
        let result = generate_keypair(&mut ChaCha20Rng::seed_from_u64(1), 512);
        assert!(matches!(result, Err(CryptoError::AsymmetricKey { .. })));
    }

    #[test]
    fn public_key_der_round_trip() {
        let public = keypair(1).to_public_key();
        let der = public_key_to_der(&public).unwrap();
        assert_eq!(public_key_from_der(&der).unwrap(), public);
        assert!(public_key_from_der(&der[1..]).is_err());
    }
}
