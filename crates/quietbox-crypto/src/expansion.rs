//! Key expansion from an agreed secret into a [`KeySet`].

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{
    KEY_SIZE,
    agreement::SHARED_SECRET_SIZE,
    keyset::{COUNTER_SIZE, Counter, KeySet, Role},
    secret::Secret,
};

/// Label binding the expansion to this protocol version
const KEY_SET_LABEL: &[u8] = b"quietbox/key-set/v1";

const OUTPUT_SIZE: usize = 2 * KEY_SIZE + 2 * COUNTER_SIZE;

/// Expand a shared secret into a key set.
///
/// HKDF-SHA256 (no salt) yields four 32-byte blocks `key_a, key_b, ctr_a,
/// ctr_b`. The initiator takes them as `(in, out, in_ctr, out_ctr)`; the
/// responder takes the same blocks as `(out, in, out_ctr, in_ctr)`. The result
/// depends only on `(secret, role)`, so both parties arrive at mirrored key
/// sets without exchanging anything else.
pub fn expand(secret: &Secret<SHARED_SECRET_SIZE>, role: Role) -> KeySet {
    let hkdf = Hkdf::<Sha256>::new(None, secret.as_bytes());

    let mut okm = Zeroizing::new([0u8; OUTPUT_SIZE]);
    let Ok(()) = hkdf.expand(KEY_SET_LABEL, okm.as_mut_slice()) else {
        unreachable!("128 bytes is a valid HKDF-SHA256 output length");
    };

    let key_a = Secret::from_bytes(block(&okm, 0));
    let key_b = Secret::from_bytes(block(&okm, 1));
    let ctr_a = Counter::from_bytes(block(&okm, 2));
    let ctr_b = Counter::from_bytes(block(&okm, 3));

    match role {
        Role::Initiator => KeySet::new(key_a, key_b, ctr_a, ctr_b, true),
        Role::Responder => KeySet::new(key_b, key_a, ctr_b, ctr_a, false),
    }
}

fn block(okm: &[u8; OUTPUT_SIZE], index: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&okm[index * 32..(index + 1) * 32]);
    out
}
