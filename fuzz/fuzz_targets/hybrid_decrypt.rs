//! Fuzz target for hybrid (RSA-OAEP + AEAD) decryption
//!
//! Join requests arrive from anyone holding the study invitation, so the
//! decryptor sees fully attacker-controlled bytes. It must reject them with
//! an error, never a panic.

#![no_main]

use std::sync::OnceLock;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use quietbox_crypto::{
    RsaPrivateKey,
    hybrid::{MIN_RSA_BITS, decrypt_hybrid, encrypt_hybrid, generate_keypair},
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn study_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        generate_keypair(&mut rng, MIN_RSA_BITS).expect("fixed-seed key generation")
    })
}

#[derive(Debug, Arbitrary)]
struct Input {
    message: Vec<u8>,
    expected_sequence: Option<u32>,
    plaintext: Vec<u8>,
    sequence: u32,
    seed: u64,
}

fuzz_target!(|input: Input| {
    let key = study_key();

    let _ = decrypt_hybrid(&input.message, key, input.expected_sequence);

    let mut rng = ChaCha20Rng::seed_from_u64(input.seed);
    let sealed = encrypt_hybrid(&input.plaintext, &key.to_public_key(), input.sequence, &mut rng)
        .expect("encryption to a valid key");
    let opened = decrypt_hybrid(&sealed, key, input.expected_sequence);

    match input.expected_sequence {
        Some(expected) if expected != input.sequence => assert!(opened.is_err()),
        _ => assert_eq!(opened.expect("matching sequence opens"), input.plaintext),
    }
});
