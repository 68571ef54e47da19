//! Per-relationship key and counter state.
//!
//! A [`KeySet`] is the only durable secret two relationship parties share. It
//! is created once by [`crate::expand`], persisted by the caller, and mutated
//! only through [`crate::derivation::notify_used`]. What one party calls
//! inbound the other calls outbound.

use std::fmt;

use quietbox_proto::ProtocolError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{KEY_SIZE, error::CryptoError, secret::Secret};

/// Size of a chain counter (256-bit big-endian).
pub const COUNTER_SIZE: usize = 32;

/// Which side of a relationship started the key agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The party that expands with the natural output order
    Initiator,
    /// The party that expands with inbound and outbound swapped
    Responder,
}

impl Role {
    /// Role from the persisted `initiated` flag.
    pub fn from_initiated(initiated: bool) -> Self {
        if initiated { Self::Initiator } else { Self::Responder }
    }
}

/// One of the two identifier chains of a key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Chain the peer writes and we read
    Inbound,
    /// Chain we write and the peer reads
    Outbound,
}

/// 256-bit big-endian chain counter.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter(#[serde(with = "serde_bytes")] [u8; COUNTER_SIZE]);

impl Counter {
    /// Wrap raw counter bytes.
    pub fn from_bytes(bytes: [u8; COUNTER_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw counter bytes.
    pub fn as_bytes(&self) -> &[u8; COUNTER_SIZE] {
        &self.0
    }

    /// Add one, wrapping from `2^256 - 1` to zero.
    pub fn increment(&mut self) {
        for byte in self.0.iter_mut().rev() {
            let (next, overflow) = byte.overflowing_add(1);
            *byte = next;
            if !overflow {
                return;
            }
        }
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Counter(***)")
    }
}

/// Directional symmetric keys and counters shared by two parties.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    inbound_key: Secret<KEY_SIZE>,
    outbound_key: Secret<KEY_SIZE>,
    inbound_counter: Counter,
    outbound_counter: Counter,
    initiated: bool,
    storage_id: Option<u64>,
}

impl KeySet {
    /// Assemble a key set from already-validated parts.
    pub fn new(
        inbound_key: Secret<KEY_SIZE>,
        outbound_key: Secret<KEY_SIZE>,
        inbound_counter: Counter,
        outbound_counter: Counter,
        initiated: bool,
    ) -> Self {
        Self { inbound_key, outbound_key, inbound_counter, outbound_counter, initiated, storage_id: None }
    }

    /// Rebuild a key set from untrusted slices, e.g. a database row.
    ///
    /// # Errors
    ///
    /// `CryptoError::Format` if any key or counter is not exactly 32 bytes.
    pub fn from_parts(
        inbound_key: &[u8],
        outbound_key: &[u8],
        inbound_counter: &[u8],
        outbound_counter: &[u8],
        initiated: bool,
    ) -> Result<Self, CryptoError> {
        Ok(Self::new(
            Secret::from_bytes(fixed("inbound key", inbound_key)?),
            Secret::from_bytes(fixed("outbound key", outbound_key)?),
            Counter::from_bytes(fixed("inbound counter", inbound_counter)?),
            Counter::from_bytes(fixed("outbound counter", outbound_counter)?),
            initiated,
        ))
    }

    /// Key for reading the peer's chain.
    pub fn inbound_key(&self) -> &Secret<KEY_SIZE> {
        &self.inbound_key
    }

    /// Key for writing our chain.
    pub fn outbound_key(&self) -> &Secret<KEY_SIZE> {
        &self.outbound_key
    }

    /// Current position of the peer's chain.
    pub fn inbound_counter(&self) -> &Counter {
        &self.inbound_counter
    }

    /// Current position of our chain.
    pub fn outbound_counter(&self) -> &Counter {
        &self.outbound_counter
    }

    /// Key for the given direction.
    pub fn key(&self, direction: Direction) -> &Secret<KEY_SIZE> {
        match direction {
            Direction::Inbound => &self.inbound_key,
            Direction::Outbound => &self.outbound_key,
        }
    }

    /// Counter for the given direction.
    pub fn counter(&self, direction: Direction) -> &Counter {
        match direction {
            Direction::Inbound => &self.inbound_counter,
            Direction::Outbound => &self.outbound_counter,
        }
    }

    /// Whether this side initiated the key agreement.
    pub fn initiated(&self) -> bool {
        self.initiated
    }

    /// Handle assigned by the persistence layer, if any.
    pub fn storage_id(&self) -> Option<u64> {
        self.storage_id
    }

    /// Record the persistence handle.
    pub fn set_storage_id(&mut self, id: u64) {
        self.storage_id = Some(id);
    }

    /// SHA-256 over the four fields in initiator order.
    ///
    /// Both parties compute the same value, so it can be compared out of band
    /// to confirm that the agreement was not intercepted.
    pub fn fingerprint(&self) -> [u8; 32] {
        let (a_key, b_key, a_ctr, b_ctr) = if self.initiated {
            (&self.inbound_key, &self.outbound_key, &self.inbound_counter, &self.outbound_counter)
        } else {
            (&self.outbound_key, &self.inbound_key, &self.outbound_counter, &self.inbound_counter)
        };

        Sha256::new()
            .chain_update(a_key.as_bytes())
            .chain_update(b_key.as_bytes())
            .chain_update(a_ctr.as_bytes())
            .chain_update(b_ctr.as_bytes())
            .finalize()
            .into()
    }

    /// Hex rendering of [`KeySet::fingerprint`].
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint())
    }

    pub(crate) fn advance(&mut self, direction: Direction) {
        match direction {
            Direction::Inbound => self.inbound_counter.increment(),
            Direction::Outbound => self.outbound_counter.increment(),
        }
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("initiated", &self.initiated)
            .field("storage_id", &self.storage_id)
            .finish_non_exhaustive()
    }
}

fn fixed<const N: usize>(what: &'static str, bytes: &[u8]) -> Result<[u8; N], CryptoError> {
    <[u8; N]>::try_from(bytes).map_err(|_| {
        CryptoError::Format(ProtocolError::InvalidLength { what, expected: N, actual: bytes.len() })
    })
}
