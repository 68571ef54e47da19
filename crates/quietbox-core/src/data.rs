//! Content objects and the data blocks that carry them.

use quietbox_crypto::{KEY_SIZE, Secret, content::open_content};
use quietbox_proto::{Identifier, cbor};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Persistence handle of a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudyId(pub u64);

/// Persistence handle of one participant relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub u64);

/// What a shared item contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareableKind {
    /// Location track
    Track,
    /// Step counter readings
    StepCount,
}

/// Precision the participant chose to share at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    /// Full resolution
    Fine,
    /// Reduced resolution
    Coarse,
    /// Heavily reduced resolution
    VeryCoarse,
}

/// A unit of content shared with a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shareable {
    /// Content type
    pub kind: ShareableKind,
    /// Sharing precision
    pub granularity: Granularity,
    /// Free-form description set by the participant
    pub description: String,
    /// Serialized payload, opaque to the protocol
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
    /// Relationship the item was received over; set by the receiver and not
    /// transmitted
    #[serde(skip)]
    pub owner: Option<ParticipantId>,
}

impl Shareable {
    /// New item without an owner.
    pub fn new(
        kind: ShareableKind,
        granularity: Granularity,
        description: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self { kind, granularity, description: description.into(), body, owner: None }
    }

    /// Encode for sealing.
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        cbor::to_vec(self).map_err(|e| CoreError::Format { reason: e.to_string() })
    }

    /// Decode an opened data-block.
    ///
    /// Content that authenticated but does not parse came from a peer that
    /// holds the relationship key, so it is a protocol violation.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        cbor::from_slice(bytes).map_err(|e| CoreError::violation(format!("content: {e}")))
    }
}

/// One unit of content addressed for retrieval.
///
/// Key and identifier suffice to fetch and open it; the ciphertext is filled
/// in once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    key: Secret<KEY_SIZE>,
    identifier: Identifier,
    ciphertext: Option<Vec<u8>>,
    owner: Option<ParticipantId>,
    granularity: Option<Granularity>,
}

impl DataBlock {
    /// Block addressed by `identifier`, opened with `key`.
    pub fn new(key: Secret<KEY_SIZE>, identifier: Identifier) -> Self {
        Self { key, identifier, ciphertext: None, owner: None, granularity: None }
    }

    /// Attach the relationship this block arrived over.
    #[must_use]
    pub fn with_owner(mut self, owner: ParticipantId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Attach the granularity tag.
    #[must_use]
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Content identifier.
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Content key.
    pub fn key(&self) -> &Secret<KEY_SIZE> {
        &self.key
    }

    /// Owning relationship, if known.
    pub fn owner(&self) -> Option<ParticipantId> {
        self.owner
    }

    /// Granularity tag, if known.
    pub fn granularity(&self) -> Option<Granularity> {
        self.granularity
    }

    /// Fetched ciphertext, if any.
    pub fn ciphertext(&self) -> Option<&[u8]> {
        self.ciphertext.as_deref()
    }

    /// Record the fetched ciphertext. A block is fetched at most once.
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if a ciphertext was already recorded.
    pub fn set_ciphertext(&mut self, ciphertext: Vec<u8>) -> Result<(), CoreError> {
        if self.ciphertext.is_some() {
            return Err(CoreError::violation(format!(
                "data block {} fetched twice",
                self.identifier.short_hex()
            )));
        }
        self.ciphertext = Some(ciphertext);
        Ok(())
    }

    /// Open the fetched ciphertext into a content object carrying this
    /// block's owner.
    ///
    /// # Errors
    ///
    /// - `ProtocolViolation` if nothing was fetched or the content does not
    ///   parse
    /// - `AuthenticationFailed` / `Format` from the envelope
    pub fn open(&self) -> Result<Shareable, CoreError> {
        let sealed = self
            .ciphertext
            .as_deref()
            .ok_or_else(|| CoreError::violation("data block has no ciphertext"))?;

        let plaintext = open_content(sealed, &self.key, &self.identifier)?;
        let mut item = Shareable::decode(&plaintext)?;
        item.owner = self.owner;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use quietbox_crypto::content::seal_content;

    use super::*;

    fn item() -> Shareable {
        Shareable::new(ShareableKind::StepCount, Granularity::Coarse, "daily steps", vec![1, 2, 3])
    }

    fn sealed_block() -> DataBlock {
        let key = Secret::from_bytes([8; KEY_SIZE]);
        let identifier = Identifier::from_bytes([9; 32]);
        let ciphertext = seal_content(&item().encode().unwrap(), &key, &identifier, [0; 24]);

        let mut block = DataBlock::new(key, identifier).with_owner(ParticipantId(4));
        block.set_ciphertext(ciphertext).unwrap();
        block
    }

    #[test]
    fn open_attaches_owner() {
        let opened = sealed_block().open().unwrap();
        assert_eq!(opened.owner, Some(ParticipantId(4)));
        assert_eq!(opened.body, vec![1, 2, 3]);
    }

    #[test]
    fn owner_is_not_transmitted() {
        let mut shared = item();
        shared.owner = Some(ParticipantId(99));
        let decoded = Shareable::decode(&shared.encode().unwrap()).unwrap();
        assert_eq!(decoded.owner, None);
    }

    #[test]
    fn ciphertext_is_set_once() {
        let mut block = sealed_block();
        assert!(matches!(block.set_ciphertext(vec![]), Err(CoreError::ProtocolViolation { .. })));
    }

    #[test]
    fn open_without_ciphertext_fails() {
        let block = DataBlock::new(Secret::from_bytes([0; KEY_SIZE]), Identifier::from_bytes([0; 32]));
        assert!(block.open().is_err());
    }

    #[test]
    fn tampered_content_fails_authentication() {
        let mut block = sealed_block();
        let mut bytes = block.ciphertext().unwrap().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;
        block.ciphertext = Some(bytes);

        assert_eq!(block.open().unwrap_err(), CoreError::AuthenticationFailed);
    }
}
