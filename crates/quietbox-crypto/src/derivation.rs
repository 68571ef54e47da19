//! Identifier chains over a key set's counters.
//!
//! ```text
//! revocation = SHA-256(key ‖ counter)
//! identifier = SHA-256(revocation)
//! ```
//!
//! Derivation never mutates the key set. Moving a chain forward is a separate,
//! explicit [`notify_used`] call.

use quietbox_proto::{Identifier, RevocationToken, TOKEN_SIZE, TokenPair};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::keyset::{Direction, KeySet};

/// Token pair for the current position of `direction`'s chain.
pub fn generate(key_set: &KeySet, direction: Direction) -> TokenPair {
    let digest: [u8; TOKEN_SIZE] = Sha256::new()
        .chain_update(key_set.key(direction).as_bytes())
        .chain_update(key_set.counter(direction).as_bytes())
        .finalize()
        .into();

    let revocation = RevocationToken::from_bytes(digest);
    TokenPair::new(identifier_for(&revocation), revocation)
}

/// Token pair the peer will write next.
pub fn generate_inbound(key_set: &KeySet) -> TokenPair {
    generate(key_set, Direction::Inbound)
}

/// Token pair we write next.
pub fn generate_outbound(key_set: &KeySet) -> TokenPair {
    generate(key_set, Direction::Outbound)
}

/// Advance `direction`'s counter by one.
///
/// Call exactly once per identifier actually presented to the server. A
/// missed or doubled call desynchronizes the two parties permanently; the
/// protocol has no way to notice or repair that.
pub fn notify_used(key_set: &mut KeySet, direction: Direction) {
    key_set.advance(direction);
}

/// Token pair unrelated to any relationship.
pub fn generate_random<R: RngCore + CryptoRng>(rng: &mut R) -> TokenPair {
    let mut bytes = [0u8; TOKEN_SIZE];
    rng.fill_bytes(&mut bytes);

    let revocation = RevocationToken::from_bytes(bytes);
    TokenPair::new(identifier_for(&revocation), revocation)
}

/// One-way map from a revocation token to its identifier.
pub fn identifier_for(revocation: &RevocationToken) -> Identifier {
    Identifier::from_bytes(Sha256::digest(revocation.as_bytes()).into())
}

/// Whether `revocation` authorizes deleting `identifier`.
///
/// Compares in constant time.
pub fn verify_pair(identifier: &Identifier, revocation: &RevocationToken) -> bool {
    identifier_for(revocation).as_bytes().ct_eq(identifier.as_bytes()).into()
}
