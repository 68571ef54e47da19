//! Cryptographic core of the quietbox relationship protocol.
//!
//! # Architecture
//!
//! ```text
//! KeyAgreement (X25519)
//!     │ shared secret
//!     ▼
//! expand(secret, role)  ──HKDF-SHA256──►  KeySet { in/out key, in/out counter }
//!                                             │
//!            ┌────────────────────────────────┼───────────────────────┐
//!            ▼                                ▼                       ▼
//!   derivation::generate            key_block::seal/open      content::seal/open
//!   revocation = H(key ‖ ctr)       nonce = H(label ‖ ctr)    random nonce,
//!   identifier = H(revocation)      XChaCha20-Poly1305        AAD = identifier
//!
//! hybrid::encrypt/decrypt   RSA-OAEP wrapped one-time key + XChaCha20-Poly1305,
//!                           10-byte header authenticated as AAD
//! ```
//!
//! Functions are pure: randomness is supplied by the caller, either as an RNG
//! object or as explicit bytes, so every operation can be replayed in tests.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod agreement;
pub mod content;
pub mod derivation;
pub mod error;
pub mod expansion;
pub mod hybrid;
pub mod key_block;
pub mod keyset;
pub mod secret;

pub use agreement::{KeyAgreement, KeyShare, PeerKeyShare};
pub use error::CryptoError;
pub use expansion::expand;
pub use key_block::KeyBlock;
pub use keyset::{Counter, Direction, KeySet, Role};
pub use secret::Secret;
/// Re-exported so callers can name key types without a direct `rsa` dependency.
pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Size of every symmetric key in the protocol (256 bits).
pub const KEY_SIZE: usize = 32;
