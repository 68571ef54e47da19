//! Persistence collaborator for key sets and received content.
//!
//! Counters never travel back into the store as part of a whole key set.
//! Each advance is a compare-and-swap on one direction of one relationship,
//! so a stale copy held by a publisher or a second synchronizer can never
//! roll a counter back. A lost swap means someone else already used the slot.
//!
//! Two pieces of in-flight work survive a failed call:
//! - a [`PendingShare`], the key-block a publisher may already have sent for
//!   its current outbound slot, re-sent unchanged before anything new is sealed
//! - pending revocations, consumed inbound slots whose delete has not been
//!   confirmed by the server

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use quietbox_crypto::{Counter, Direction, KeyBlock, KeySet, derivation::notify_used};
use quietbox_proto::TokenPair;
use thiserror::Error;

use crate::data::{ParticipantId, Shareable, StudyId};

/// Persistence failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// Participant was never added
    #[error("unknown participant {0:?}")]
    UnknownParticipant(ParticipantId),

    /// Stored counter is not the one the caller expected to advance
    #[error("{direction:?} counter of participant {participant:?} moved concurrently")]
    CounterMoved {
        /// Relationship whose counter moved
        participant: ParticipantId,
        /// Chain that moved
        direction: Direction,
    },

    /// Another share is still being placed for this relationship
    #[error("share already pending for participant {0:?}")]
    ShareInProgress(ParticipantId),

    /// Underlying store failed
    #[error("persistence backend error: {reason}")]
    Backend {
        /// Backend-specific description
        reason: String,
    },
}

/// A share whose key-block may have reached the server but whose outbound
/// advance is not yet recorded.
///
/// Sealing is deterministic in the key set and the block, so re-sealing this
/// block at the same counter reproduces the bytes already sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingShare {
    /// Key-block being placed
    pub block: KeyBlock,
    /// Location of the data-block it points at
    pub content: TokenPair,
}

/// Storage for relationship state and received content.
///
/// Implementations share state across clones, like a connection handle.
/// Every method taking a participant fails with
/// [`PersistenceError::UnknownParticipant`] for a handle never added.
pub trait Persistence: Clone + Send + Sync + 'static {
    /// Record a new relationship under `study` and return its handle.
    fn add_participant(
        &self,
        study: StudyId,
        key_set: &KeySet,
    ) -> Result<ParticipantId, PersistenceError>;

    /// Current key set of one relationship.
    fn load_key_set(&self, participant: ParticipantId) -> Result<KeySet, PersistenceError>;

    /// Every relationship of `study`, in handle order.
    fn load_key_sets_for(
        &self,
        study: StudyId,
    ) -> Result<Vec<(ParticipantId, KeySet)>, PersistenceError>;

    /// Step one chain of `participant` if its stored counter still equals
    /// `expected`. The other chain is untouched.
    ///
    /// Fails with [`PersistenceError::CounterMoved`] otherwise.
    fn advance_counter(
        &self,
        participant: ParticipantId,
        direction: Direction,
        expected: &Counter,
    ) -> Result<(), PersistenceError>;

    /// Step the inbound chain past a consumed key-block and queue `slot` for
    /// revocation, as one write. Same compare-and-swap rule as
    /// [`Persistence::advance_counter`].
    fn consume_slot(
        &self,
        participant: ParticipantId,
        expected: &Counter,
        slot: &TokenPair,
    ) -> Result<(), PersistenceError>;

    /// Consumed slots of `participant` not yet deleted on the server.
    fn pending_revocations(
        &self,
        participant: ParticipantId,
    ) -> Result<Vec<TokenPair>, PersistenceError>;

    /// Forget revocations the server has confirmed.
    fn clear_revocations(
        &self,
        participant: ParticipantId,
        slots: &[TokenPair],
    ) -> Result<(), PersistenceError>;

    /// The share left in flight for `participant`, if any.
    fn pending_share(
        &self,
        participant: ParticipantId,
    ) -> Result<Option<PendingShare>, PersistenceError>;

    /// Record `share` as in flight. Fails with
    /// [`PersistenceError::ShareInProgress`] if one already is.
    fn begin_share(
        &self,
        participant: ParticipantId,
        share: &PendingShare,
    ) -> Result<(), PersistenceError>;

    /// Step the outbound chain past the slot now holding the in-flight
    /// key-block and drop the in-flight share, as one write. Same
    /// compare-and-swap rule as [`Persistence::advance_counter`].
    fn complete_share(
        &self,
        participant: ParticipantId,
        expected: &Counter,
    ) -> Result<(), PersistenceError>;

    /// Drop an in-flight share that was never stored in any slot.
    fn abandon_share(&self, participant: ParticipantId) -> Result<(), PersistenceError>;

    /// Store one received content item.
    fn save_content(&self, item: &Shareable) -> Result<(), PersistenceError>;
}

/// In-memory persistence for tests and the harness.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    inner: Arc<Mutex<MemoryPersistenceInner>>,
}

#[derive(Default)]
struct MemoryPersistenceInner {
    next_id: u64,
    participants: BTreeMap<ParticipantId, Relationship>,
    content: Vec<Shareable>,
}

struct Relationship {
    study: StudyId,
    key_set: KeySet,
    revocations: Vec<TokenPair>,
    pending_share: Option<PendingShare>,
}

impl MemoryPersistenceInner {
    fn relationship(&mut self, participant: ParticipantId) -> Result<&mut Relationship, PersistenceError> {
        self.participants
            .get_mut(&participant)
            .ok_or(PersistenceError::UnknownParticipant(participant))
    }

    fn step(
        &mut self,
        participant: ParticipantId,
        direction: Direction,
        expected: &Counter,
    ) -> Result<&mut Relationship, PersistenceError> {
        let relationship = self.relationship(participant)?;
        if relationship.key_set.counter(direction) != expected {
            return Err(PersistenceError::CounterMoved { participant, direction });
        }
        notify_used(&mut relationship.key_set, direction);
        Ok(relationship)
    }
}

impl MemoryPersistence {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored key set of one participant.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn key_set(&self, participant: ParticipantId) -> Option<KeySet> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        inner.participants.get(&participant).map(|r| r.key_set.clone())
    }

    /// Every content item saved so far, in arrival order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn content(&self) -> Vec<Shareable> {
        self.inner.lock().expect("Mutex poisoned").content.clone()
    }
}

impl Persistence for MemoryPersistence {
    #[allow(clippy::expect_used)]
    fn add_participant(
        &self,
        study: StudyId,
        key_set: &KeySet,
    ) -> Result<ParticipantId, PersistenceError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let id = ParticipantId(inner.next_id);
        inner.next_id += 1;

        let mut stored = key_set.clone();
        stored.set_storage_id(id.0);
        inner.participants.insert(
            id,
            Relationship { study, key_set: stored, revocations: Vec::new(), pending_share: None },
        );
        Ok(id)
    }

    #[allow(clippy::expect_used)]
    fn load_key_set(&self, participant: ParticipantId) -> Result<KeySet, PersistenceError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.relationship(participant)?.key_set.clone())
    }

    #[allow(clippy::expect_used)]
    fn load_key_sets_for(
        &self,
        study: StudyId,
    ) -> Result<Vec<(ParticipantId, KeySet)>, PersistenceError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        Ok(inner
            .participants
            .iter()
            .filter(|(_, r)| r.study == study)
            .map(|(id, r)| (*id, r.key_set.clone()))
            .collect())
    }

    #[allow(clippy::expect_used)]
    fn advance_counter(
        &self,
        participant: ParticipantId,
        direction: Direction,
        expected: &Counter,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.step(participant, direction, expected)?;
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn consume_slot(
        &self,
        participant: ParticipantId,
        expected: &Counter,
        slot: &TokenPair,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.step(participant, Direction::Inbound, expected)?.revocations.push(*slot);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn pending_revocations(
        &self,
        participant: ParticipantId,
    ) -> Result<Vec<TokenPair>, PersistenceError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.relationship(participant)?.revocations.clone())
    }

    #[allow(clippy::expect_used)]
    fn clear_revocations(
        &self,
        participant: ParticipantId,
        slots: &[TokenPair],
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.relationship(participant)?.revocations.retain(|queued| !slots.contains(queued));
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn pending_share(
        &self,
        participant: ParticipantId,
    ) -> Result<Option<PendingShare>, PersistenceError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.relationship(participant)?.pending_share.clone())
    }

    #[allow(clippy::expect_used)]
    fn begin_share(
        &self,
        participant: ParticipantId,
        share: &PendingShare,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let relationship = inner.relationship(participant)?;
        if relationship.pending_share.is_some() {
            return Err(PersistenceError::ShareInProgress(participant));
        }
        relationship.pending_share = Some(share.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn complete_share(
        &self,
        participant: ParticipantId,
        expected: &Counter,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.step(participant, Direction::Outbound, expected)?.pending_share = None;
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn abandon_share(&self, participant: ParticipantId) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.relationship(participant)?.pending_share = None;
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn save_content(&self, item: &Shareable) -> Result<(), PersistenceError> {
        self.inner.lock().expect("Mutex poisoned").content.push(item.clone());
        Ok(())
    }
}
