//! X25519 key agreement.
//!
//! One [`KeyAgreement`] yields one shared secret per accepted partner. The
//! local key pair survives [`KeyAgreement::reset`], so a study can run many
//! agreements with the same long-lived public value.

use std::fmt;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{error::CryptoError, secret::Secret};

/// Size of an X25519 public value.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of the raw X25519 shared secret.
pub const SHARED_SECRET_SIZE: usize = 32;

/// Anything that can present an X25519 public value.
pub trait KeyShare {
    /// The public half to send to the partner.
    fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE];
}

/// Local side of a key agreement.
pub struct KeyAgreement {
    secret: StaticSecret,
    public: PublicKey,
    shared: Option<Secret<SHARED_SECRET_SIZE>>,
}

impl KeyAgreement {
    /// Generate a fresh key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_static(StaticSecret::random_from_rng(rng))
    }

    /// Restore a key pair from its persisted private scalar.
    pub fn from_secret_bytes(bytes: Secret<32>) -> Self {
        Self::from_static(StaticSecret::from(*bytes.as_bytes()))
    }

    fn from_static(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public, shared: None }
    }

    /// Private scalar, for persisting a long-lived agreement.
    pub fn secret_bytes(&self) -> Secret<32> {
        Secret::from_bytes(self.secret.to_bytes())
    }

    /// Public half in the form sent to the partner.
    pub fn public_share(&self) -> PeerKeyShare {
        PeerKeyShare(self.public.to_bytes())
    }

    /// Accept the partner's public value and compute the shared secret.
    ///
    /// # Errors
    ///
    /// - `AlreadyAgreed` if a partner value was accepted since the last reset
    /// - `InvalidPeerKey` if `peer` is not 32 bytes or is a low-order point
    ///   that would make the shared secret independent of our key
    pub fn accept_peer(&mut self, peer: &[u8]) -> Result<(), CryptoError> {
        if self.shared.is_some() {
            return Err(CryptoError::AlreadyAgreed);
        }

        let bytes: [u8; PUBLIC_KEY_SIZE] = peer
            .try_into()
            .map_err(|_| CryptoError::InvalidPeerKey { reason: "public value must be 32 bytes" })?;

        let shared = self.secret.diffie_hellman(&PublicKey::from(bytes));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPeerKey { reason: "low-order point" });
        }

        self.shared = Some(Secret::from_bytes(shared.to_bytes()));
        Ok(())
    }

    /// Accept a partner presented as a [`KeyShare`].
    pub fn accept_share(&mut self, share: &impl KeyShare) -> Result<(), CryptoError> {
        self.accept_peer(&share.public_bytes())
    }

    /// The agreed secret.
    ///
    /// # Errors
    ///
    /// `NotReady` until a partner value has been accepted.
    pub fn shared_secret(&self) -> Result<&Secret<SHARED_SECRET_SIZE>, CryptoError> {
        self.shared.as_ref().ok_or(CryptoError::NotReady)
    }

    /// Whether a partner value has been accepted.
    pub fn is_agreed(&self) -> bool {
        self.shared.is_some()
    }

    /// Forget the shared secret and re-arm the same key pair.
    pub fn reset(&mut self) {
        self.shared = None;
    }
}

impl KeyShare for KeyAgreement {
    fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }
}

impl fmt::Debug for KeyAgreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAgreement")
            .field("public", &hex::encode(self.public.as_bytes()))
            .field("agreed", &self.is_agreed())
            .finish_non_exhaustive()
    }
}

/// Public value of a remote party, as received over the wire.
///
/// Holds no private material, so it can only be handed to
/// [`KeyAgreement::accept_share`].
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerKeyShare(#[serde(with = "serde_bytes")] [u8; PUBLIC_KEY_SIZE]);

impl PeerKeyShare {
    /// Parse a received public value.
    ///
    /// # Errors
    ///
    /// `InvalidPeerKey` unless `bytes` is 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| CryptoError::InvalidPeerKey { reason: "public value must be 32 bytes" })
    }
}

impl KeyShare for PeerKeyShare {
    fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0
    }
}

impl fmt::Debug for PeerKeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerKeyShare({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn pair(seed: u64) -> (KeyAgreement, KeyAgreement) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        (KeyAgreement::generate(&mut rng), KeyAgreement::generate(&mut rng))
    }

    #[test]
    fn both_sides_agree() {
        let (mut alice, mut bob) = pair(1);
        alice.accept_peer(&bob.public_bytes()).unwrap();
        bob.accept_peer(&alice.public_bytes()).unwrap();

        assert_eq!(alice.shared_secret().unwrap(), bob.shared_secret().unwrap());
    }

    #[test]
    fn secret_before_partner_is_not_ready() {
        let (alice, _) = pair(2);
        assert_eq!(alice.shared_secret().unwrap_err(), CryptoError::NotReady);
    }

    #[test]
    fn second_accept_requires_reset() {
        let (mut alice, bob) = pair(3);
        alice.accept_share(&bob).unwrap();
        assert_eq!(alice.accept_share(&bob).unwrap_err(), CryptoError::AlreadyAgreed);

        alice.reset();
        assert!(!alice.is_agreed());
        alice.accept_share(&bob).unwrap();
    }

    #[test]
    fn reset_keeps_the_key_pair() {
        let (mut alice, bob) = pair(4);
        let before = alice.public_bytes();
        alice.accept_share(&bob).unwrap();
        let first = alice.shared_secret().unwrap().clone();

        alice.reset();
        alice.accept_share(&bob).unwrap();

        assert_eq!(alice.public_bytes(), before);
        assert_eq!(alice.shared_secret().unwrap(), &first);
    }

    #[test]
    fn wrong_length_peer_rejected() {
        let (mut alice, _) = pair(5);
        assert!(matches!(alice.accept_peer(&[9u8; 31]), Err(CryptoError::InvalidPeerKey { .. })));
        assert!(!alice.is_agreed());
    }

    #[test]
    fn low_order_peer_rejected() {
        let (mut alice, _) = pair(6);
        assert!(matches!(alice.accept_peer(&[0u8; 32]), Err(CryptoError::InvalidPeerKey { .. })));
    }

    #[test]
    fn restored_agreement_has_same_public_value() {
        let (alice, _) = pair(7);
        let restored = KeyAgreement::from_secret_bytes(alice.secret_bytes());
        assert_eq!(restored.public_bytes(), alice.public_bytes());
    }

    #[test]
    fn peer_share_stands_in_for_remote_party() {
        let (mut alice, bob) = pair(8);
        let share = PeerKeyShare::from_slice(&bob.public_bytes()).unwrap();

        alice.accept_share(&share).unwrap();
        assert!(alice.is_agreed());
        assert!(PeerKeyShare::from_slice(&[1u8; 5]).is_err());
    }
}
