//! Sharing content over an established relationship.
//!
//! A share writes two values. The data-block goes to a fresh random
//! identifier under a one-time content key; the key-block pointing at it goes
//! to the next slot of the sender's outbound chain.
//!
//! The key-block is recorded as a [`PendingShare`] before it is first sent
//! and stays recorded until the outbound advance is persisted. A share that
//! fails halfway is finished by the next call, which re-seals the same block
//! at the same counter and so sends byte-identical ciphertext. One counter
//! never seals two different key-blocks, and a data-block is only deleted
//! when its key-block was refused by every slot tried.

use quietbox_crypto::{
    Direction, KeyBlock, Secret,
    content::seal_content,
    derivation::{generate_outbound, generate_random},
    key_block::seal_key_block,
};
use quietbox_proto::TokenPair;
use tracing::{debug, info, warn};

use crate::{
    config::SyncConfig,
    data::{ParticipantId, Shareable},
    env::{EnvRng, Environment},
    error::CoreError,
    filter::MembershipFilter,
    persistence::{PendingShare, Persistence},
    store::{StoreClient, StoreError},
    transport::Transport,
};

/// Where a share was stored.
///
/// Holding the revocation tokens lets the sender withdraw the share later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareReceipt {
    /// Outbound chain slot holding the key-block
    pub key_block: TokenPair,
    /// Random location of the data-block
    pub content: TokenPair,
}

/// Sender side of a relationship.
#[derive(Debug)]
pub struct Publisher<T, F, P, E> {
    store: StoreClient<T, F>,
    persistence: P,
    env: E,
    config: SyncConfig,
}

impl<T, F, P, E> Publisher<T, F, P, E>
where
    T: Transport,
    F: MembershipFilter,
    P: Persistence,
    E: Environment,
{
    /// Publisher writing through `store`.
    pub fn new(store: StoreClient<T, F>, persistence: P, env: E, config: SyncConfig) -> Self {
        Self { store, persistence, env, config }
    }

    /// The store client.
    pub fn store_mut(&mut self) -> &mut StoreClient<T, F> {
        &mut self.store
    }

    /// Share `item` with the other party of `participant`.
    ///
    /// The outbound counter is read from persistence, never from a caller's
    /// copy. A share left in flight by an earlier failed call is placed
    /// first. An occupied outbound slot is skipped by advancing past it, at
    /// most `max_slot_skips` times.
    ///
    /// # Errors
    ///
    /// - `TransportUnavailable` if a write could not be delivered; the share
    ///   stays in flight and the next call finishes it
    /// - `ProtocolViolation` if every allowed slot was occupied
    /// - `Storage` if the relationship is unknown or an advance could not be
    ///   persisted; the share stays in flight as above
    pub fn share(
        &mut self,
        participant: ParticipantId,
        item: &Shareable,
    ) -> Result<ShareReceipt, CoreError> {
        if let Some(pending) = self.persistence.pending_share(participant)? {
            debug!(participant = participant.0, "finishing interrupted share");
            self.settle(participant, &pending)?;
        }

        let content_key = Secret::from_bytes(self.env.random_array());
        let content = generate_random(&mut EnvRng::new(&self.env));
        let sealed = seal_content(&item.encode()?, &content_key, &content.identifier, self.env.random_array());

        self.store.put(&content.identifier, sealed)?;
        debug!(content = %content.identifier.short_hex(), "data-block stored");

        let pending = PendingShare {
            block: KeyBlock { content_key, content_identifier: content.identifier },
            content,
        };
        if let Err(err) = self.persistence.begin_share(participant, &pending) {
            self.discard(&content);
            return Err(err.into());
        }

        let key_block = self.settle(participant, &pending)?;
        info!(
            participant = participant.0,
            slot = %key_block.identifier.short_hex(),
            "share published"
        );
        Ok(ShareReceipt { key_block, content })
    }

    /// Withdraw an unread share.
    ///
    /// The key-block slot is revoked (deleted and tombstoned) so the receiver
    /// steps past it; the data-block is deleted.
    pub fn withdraw(&mut self, receipt: &ShareReceipt) -> Result<(), CoreError> {
        self.store.revoke(&receipt.key_block)?;
        self.store.delete(&receipt.content)?;
        Ok(())
    }

    /// Place the in-flight `pending` share and drop it from persistence.
    fn settle(&mut self, participant: ParticipantId, pending: &PendingShare) -> Result<TokenPair, CoreError> {
        if let Some(slot) = self.place_key_block(participant, &pending.block)? {
            return Ok(slot);
        }

        // Refused by every slot tried, so nothing points at the data-block
        self.discard(&pending.content);
        self.persistence.abandon_share(participant)?;
        Err(CoreError::violation(format!(
            "{} consecutive outbound slots occupied",
            self.config.max_slot_skips + 1
        )))
    }

    /// Returns the slot now holding `block`, or `None` if every allowed slot
    /// held a foreign value.
    fn place_key_block(
        &mut self,
        participant: ParticipantId,
        block: &KeyBlock,
    ) -> Result<Option<TokenPair>, CoreError> {
        for _ in 0..=self.config.max_slot_skips {
            let key_set = self.persistence.load_key_set(participant)?;
            let counter = *key_set.outbound_counter();
            let slot = generate_outbound(&key_set);
            let sealed = seal_key_block(block, &key_set);

            let stored = match self.store.put(&slot.identifier, sealed.clone()) {
                Ok(()) => true,
                // An earlier attempt at this counter may have landed
                Err(StoreError::KeyTaken) => {
                    self.store.get(&slot.identifier)?.is_some_and(|value| value == sealed)
                },
                Err(err) => return Err(err.into()),
            };

            if stored {
                self.persistence.complete_share(participant, &counter)?;
                return Ok(Some(slot));
            }

            warn!(
                participant = participant.0,
                slot = %slot.identifier.short_hex(),
                "outbound slot occupied, skipping"
            );
            self.persistence.advance_counter(participant, Direction::Outbound, &counter)?;
        }

        Ok(None)
    }

    fn discard(&mut self, content: &TokenPair) {
        if let Err(err) = self.store.delete(content) {
            debug!(error = %err, "orphaned data-block left in store");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io};

    use quietbox_crypto::{Counter, KEY_SIZE, KeySet, derivation::notify_used, key_block::open_key_block};
    use quietbox_proto::{DeleteReply, GetReply, PutReply, Request, Response};

    use super::*;
    use crate::{
        data::{Granularity, ShareableKind, StudyId},
        env::SystemEnv,
        persistence::MemoryPersistence,
    };

    /// Accepts puts into a map and refuses identifiers already present.
    ///
    /// Every put is recorded, including refused ones.
    #[derive(Default)]
    struct MapTransport {
        values: HashMap<Vec<u8>, Vec<u8>>,
        puts: Vec<(Vec<u8>, Vec<u8>)>,
        lose_reply_to_put: Option<usize>,
    }

    impl MapTransport {
        fn values_sent_to(&self, slot: &TokenPair) -> Vec<&Vec<u8>> {
            self.puts
                .iter()
                .filter(|(identifier, _)| identifier.as_slice() == slot.identifier.as_bytes().as_slice())
                .map(|(_, value)| value)
                .collect()
        }
    }

    impl Transport for MapTransport {
        fn transceive(&mut self, request: &[u8]) -> io::Result<Vec<u8>> {
            let response = match Request::decode(request).unwrap() {
                Request::Get { identifier } => {
                    Response::Get(self.values.get(&identifier).cloned().map_or(GetReply::Empty, GetReply::Value))
                },
                Request::Put { identifier, value } => {
                    self.puts.push((identifier.clone(), value.clone()));
                    let reply = if self.values.contains_key(&identifier) {
                        PutReply::KeyTaken
                    } else {
                        self.values.insert(identifier, value);
                        PutReply::Ok
                    };
                    if self.lose_reply_to_put == Some(self.puts.len() - 1) {
                        return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reply lost"));
                    }
                    Response::Put(reply)
                },
                Request::Delete { identifier, .. } => match self.values.remove(&identifier) {
                    Some(_) => Response::Delete(DeleteReply::Ok),
                    None => Response::Delete(DeleteReply::NotFound),
                },
                other => panic!("unexpected request {}", other.name()),
            };
            Ok(response.encode().unwrap())
        }
    }

    fn key_set() -> KeySet {
        KeySet::new(
            Secret::from_bytes([1; KEY_SIZE]),
            Secret::from_bytes([2; KEY_SIZE]),
            Counter::from_bytes([0; 32]),
            Counter::from_bytes([0; 32]),
            false,
        )
    }

    /// The other end of [`key_set`].
    fn receiver() -> KeySet {
        KeySet::new(
            Secret::from_bytes([2; KEY_SIZE]),
            Secret::from_bytes([1; KEY_SIZE]),
            Counter::from_bytes([0; 32]),
            Counter::from_bytes([0; 32]),
            true,
        )
    }

    fn item() -> Shareable {
        Shareable::new(ShareableKind::Track, Granularity::Fine, "walk", vec![5; 64])
    }

    fn publisher(
        transport: MapTransport,
        persistence: MemoryPersistence,
        max_slot_skips: usize,
    ) -> Publisher<MapTransport, crate::filter::NoFilter, MemoryPersistence, SystemEnv> {
        let config = SyncConfig { max_slot_skips, ..SyncConfig::default() };
        Publisher::new(StoreClient::new(transport), persistence, SystemEnv::new(), config)
    }

    #[test]
    fn share_advances_and_persists_outbound_only() {
        let persistence = MemoryPersistence::new();
        let id = persistence.add_participant(StudyId(0), &key_set()).unwrap();
        let expected_slot = generate_outbound(&key_set());

        let mut publisher = publisher(MapTransport::default(), persistence.clone(), 4);
        let receipt = publisher.share(id, &item()).unwrap();

        let stored = persistence.key_set(id).unwrap();
        assert_eq!(receipt.key_block, expected_slot);
        assert_ne!(generate_outbound(&stored), expected_slot);
        assert_eq!(stored.inbound_counter(), key_set().inbound_counter());
        assert_eq!(persistence.pending_share(id).unwrap(), None);
        assert_eq!(publisher.store_mut().transport_mut().values.len(), 2);
    }

    #[test]
    fn occupied_slot_is_skipped() {
        let persistence = MemoryPersistence::new();
        let id = persistence.add_participant(StudyId(0), &key_set()).unwrap();

        let mut transport = MapTransport::default();
        let taken = generate_outbound(&key_set());
        transport.values.insert(taken.identifier.as_bytes().to_vec(), vec![0]);

        let mut publisher = publisher(transport, persistence, 4);
        let receipt = publisher.share(id, &item()).unwrap();

        let mut skipped = key_set();
        notify_used(&mut skipped, Direction::Outbound);
        assert_eq!(receipt.key_block, generate_outbound(&skipped));
    }

    #[test]
    fn skip_limit_is_a_violation() {
        let persistence = MemoryPersistence::new();
        let id = persistence.add_participant(StudyId(0), &key_set()).unwrap();

        let mut transport = MapTransport::default();
        let mut squatted = key_set();
        for _ in 0..3 {
            transport.values.insert(generate_outbound(&squatted).identifier.as_bytes().to_vec(), vec![0]);
            notify_used(&mut squatted, Direction::Outbound);
        }

        let mut publisher = publisher(transport, persistence.clone(), 2);
        let err = publisher.share(id, &item()).unwrap_err();

        assert!(matches!(err, CoreError::ProtocolViolation { .. }));
        assert_eq!(persistence.key_set(id).unwrap().outbound_counter(), squatted.outbound_counter());
        assert_eq!(persistence.pending_share(id).unwrap(), None);
        // the key-block landed nowhere, so its data-block is gone again
        assert_eq!(publisher.store_mut().transport_mut().values.len(), 3);
    }

    #[test]
    fn unknown_participant_stores_nothing() {
        let mut publisher = publisher(MapTransport::default(), MemoryPersistence::new(), 4);
        let err = publisher.share(ParticipantId(42), &item()).unwrap_err();

        assert!(matches!(err, CoreError::Storage(_)));
        assert!(publisher.store_mut().transport_mut().values.is_empty());
    }

    #[test]
    fn lost_put_reply_is_resent_unchanged() {
        let persistence = MemoryPersistence::new();
        let id = persistence.add_participant(StudyId(0), &key_set()).unwrap();
        let first_slot = generate_outbound(&key_set());

        // put 0 is the data-block, put 1 the key-block
        let transport = MapTransport { lose_reply_to_put: Some(1), ..MapTransport::default() };
        let mut publisher = publisher(transport, persistence.clone(), 4);

        let err = publisher.share(id, &item()).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(persistence.key_set(id).unwrap().outbound_counter(), key_set().outbound_counter());
        let pending = persistence.pending_share(id).unwrap().unwrap();
        // data-block and key-block both stay on the server
        assert_eq!(publisher.store_mut().transport_mut().values.len(), 2);

        let receipt = publisher.share(id, &item()).unwrap();
        assert_ne!(receipt.key_block, first_slot);

        let transport = publisher.store_mut().transport_mut();
        let sent = transport.values_sent_to(&first_slot);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);

        let opened = open_key_block(sent[0], &receiver()).unwrap();
        assert_eq!(opened, pending.block);
        assert_eq!(transport.values.len(), 4);

        let mut twice = key_set();
        notify_used(&mut twice, Direction::Outbound);
        notify_used(&mut twice, Direction::Outbound);
        assert_eq!(persistence.key_set(id).unwrap().outbound_counter(), twice.outbound_counter());
        assert_eq!(persistence.pending_share(id).unwrap(), None);
    }

    #[test]
    fn each_slot_carries_at_most_one_ciphertext() {
        let persistence = MemoryPersistence::new();
        let id = persistence.add_participant(StudyId(0), &key_set()).unwrap();

        // put 4 is the second share's key-block
        let mut transport = MapTransport { lose_reply_to_put: Some(4), ..MapTransport::default() };
        let taken = generate_outbound(&key_set());
        transport.values.insert(taken.identifier.as_bytes().to_vec(), vec![0]);

        let mut publisher = publisher(transport, persistence, 4);
        for _ in 0..4 {
            publisher.share(id, &item()).ok();
        }

        let transport = publisher.store_mut().transport_mut();
        let mut by_slot: HashMap<&[u8], Vec<&Vec<u8>>> = HashMap::new();
        for (identifier, value) in &transport.puts {
            by_slot.entry(identifier.as_slice()).or_default().push(value);
        }
        assert!(by_slot.values().any(|values| values.len() == 2));
        for values in by_slot.values() {
            assert!(values.windows(2).all(|pair| pair[0] == pair[1]));
        }
    }
}
