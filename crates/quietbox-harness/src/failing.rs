//! Persistence wrapper with switchable failures.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use quietbox_core::{
    ParticipantId, PendingShare, Persistence, PersistenceError, Shareable, StudyId,
};
use quietbox_crypto::{Counter, Direction, KeySet};
use quietbox_proto::TokenPair;

/// Delegates to `P` unless the matching failure switch is on.
///
/// Counter writes are `advance_counter`, `consume_slot` and
/// `complete_share`. Clones share the switches.
#[derive(Clone)]
pub struct FailingPersistence<P: Persistence> {
    inner: P,
    fail_counters: Arc<AtomicBool>,
    refuse_counters: Arc<AtomicUsize>,
    fail_content: Arc<AtomicBool>,
}

impl<P: Persistence> FailingPersistence<P> {
    /// Wrap `inner` with every switch off.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            fail_counters: Arc::new(AtomicBool::new(false)),
            refuse_counters: Arc::new(AtomicUsize::new(0)),
            fail_content: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The wrapped persistence.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Make every counter write fail.
    pub fn fail_counters(&self, fail: bool) {
        self.fail_counters.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` counter writes fail, then recover.
    pub fn refuse_next_counters(&self, count: usize) {
        self.refuse_counters.store(count, Ordering::SeqCst);
    }

    /// Make `save_content` fail.
    pub fn fail_content(&self, fail: bool) {
        self.fail_content.store(fail, Ordering::SeqCst);
    }

    fn counter_write(&self) -> Result<(), PersistenceError> {
        let refused = self
            .refuse_counters
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused || self.fail_counters.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(())
    }
}

fn injected() -> PersistenceError {
    PersistenceError::Backend { reason: "injected failure".to_string() }
}

impl<P: Persistence> Persistence for FailingPersistence<P> {
    fn add_participant(
        &self,
        study: StudyId,
        key_set: &KeySet,
    ) -> Result<ParticipantId, PersistenceError> {
        self.inner.add_participant(study, key_set)
    }

    fn load_key_set(&self, participant: ParticipantId) -> Result<KeySet, PersistenceError> {
        self.inner.load_key_set(participant)
    }

    fn load_key_sets_for(
        &self,
        study: StudyId,
    ) -> Result<Vec<(ParticipantId, KeySet)>, PersistenceError> {
        self.inner.load_key_sets_for(study)
    }

    fn advance_counter(
        &self,
        participant: ParticipantId,
        direction: Direction,
        expected: &Counter,
    ) -> Result<(), PersistenceError> {
        self.counter_write()?;
        self.inner.advance_counter(participant, direction, expected)
    }

    fn consume_slot(
        &self,
        participant: ParticipantId,
        expected: &Counter,
        slot: &TokenPair,
    ) -> Result<(), PersistenceError> {
        self.counter_write()?;
        self.inner.consume_slot(participant, expected, slot)
    }

    fn pending_revocations(
        &self,
        participant: ParticipantId,
    ) -> Result<Vec<TokenPair>, PersistenceError> {
        self.inner.pending_revocations(participant)
    }

    fn clear_revocations(
        &self,
        participant: ParticipantId,
        slots: &[TokenPair],
    ) -> Result<(), PersistenceError> {
        self.inner.clear_revocations(participant, slots)
    }

    fn pending_share(
        &self,
        participant: ParticipantId,
    ) -> Result<Option<PendingShare>, PersistenceError> {
        self.inner.pending_share(participant)
    }

    fn begin_share(
        &self,
        participant: ParticipantId,
        share: &PendingShare,
    ) -> Result<(), PersistenceError> {
        self.inner.begin_share(participant, share)
    }

    fn complete_share(
        &self,
        participant: ParticipantId,
        expected: &Counter,
    ) -> Result<(), PersistenceError> {
        self.counter_write()?;
        self.inner.complete_share(participant, expected)
    }

    fn abandon_share(&self, participant: ParticipantId) -> Result<(), PersistenceError> {
        self.inner.abandon_share(participant)
    }

    fn save_content(&self, item: &Shareable) -> Result<(), PersistenceError> {
        if self.fail_content.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.save_content(item)
    }
}
