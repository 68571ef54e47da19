//! Mailbox synchronization on the receiving side.
//!
//! Each participant's inbound chain is read slot by slot until the server
//! reports nothing. One pass takes every queued participant one slot forward:
//!
//! ```text
//! derive inbound slots ─▶ get-many ─┬─ empty ──────────▶ idle
//!                                   ├─ tombstone ──────▶ advance, requeue
//!                                   ├─ does not open ──▶ advance, idle
//!                                   └─ key-block ──────▶ advance, fetch data-block
//!                                                          ├─ applied ─▶ requeue
//!                                                          └─ failed ──▶ idle
//! consumed key-block slots ─▶ delete-many
//! ```
//!
//! Every counter advance is a compare-and-swap in persistence, made before
//! the in-memory key set changes. A participant whose advance cannot be
//! persisted is dropped from the run. A lost swap means another run already
//! took the slot, so this run drops the participant without applying.
//!
//! Consuming a key-block also queues its slot for revocation in the same
//! write. Slots whose delete-many never got an answer stay queued and are
//! retried at the start of the next run.

use std::collections::VecDeque;

use quietbox_crypto::{
    Direction, KeyBlock, KeySet,
    derivation::{generate_inbound, notify_used},
    key_block::open_key_block,
};
use quietbox_proto::{Identifier, TOMBSTONE, TokenPair};
use tracing::{debug, error, info, warn};

use crate::{
    config::SyncConfig,
    data::{DataBlock, ParticipantId, StudyId},
    error::CoreError,
    filter::MembershipFilter,
    persistence::{Persistence, PersistenceError},
    store::{DeleteOutcome, StoreClient, StoreError},
    study::{JoinSubmission, Study},
    transport::Transport,
};

/// Counters collected over one synchronization call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Passes over the work queue
    pub passes: usize,
    /// Key-blocks that opened under the inbound key
    pub key_blocks_opened: usize,
    /// Slot values that did not open; treated as noise and stepped over
    pub key_blocks_rejected: usize,
    /// Withdrawn shares stepped over
    pub tombstones: usize,
    /// Content items handed to persistence
    pub items_applied: usize,
    /// Data-blocks missing, failing to open or failing to parse
    pub content_failures: usize,
    /// Consumed key-block slots deleted (or already gone)
    pub revoked: usize,
    /// Persistence writes that failed
    pub storage_failures: usize,
    /// Slots skipped because another run advanced the same counter first
    pub counter_conflicts: usize,
    /// Batch exchanges aborted on a malformed or failed server reply
    pub protocol_errors: usize,
    /// Join requests turned into relationships
    pub joins_accepted: usize,
    /// Join requests that did not open or did not match the study
    pub joins_rejected: usize,
}

/// A participant travelling through the work queue.
struct Pending {
    participant: ParticipantId,
    key_set: KeySet,
}

/// A key-block that opened during the current pass.
struct Opened {
    pending: Pending,
    block: KeyBlock,
}

/// Receiver side: drains inbound chains into persistence.
#[derive(Debug)]
pub struct Synchronizer<T, F, P> {
    store: StoreClient<T, F>,
    persistence: P,
    config: SyncConfig,
}

impl<T, F, P> Synchronizer<T, F, P>
where
    T: Transport,
    F: MembershipFilter,
    P: Persistence,
{
    /// Synchronizer reading through `store`.
    pub fn new(store: StoreClient<T, F>, persistence: P, config: SyncConfig) -> Self {
        Self { store, persistence, config }
    }

    /// The store client.
    pub fn store_mut(&mut self) -> &mut StoreClient<T, F> {
        &mut self.store
    }

    /// Enroll `joins` into `study`, then synchronize every participant.
    ///
    /// A join that fails to open is counted and skipped; it never stops the
    /// others.
    ///
    /// # Errors
    ///
    /// As [`Synchronizer::sync_study`].
    pub fn update_study(
        &mut self,
        study: &mut Study,
        joins: &[JoinSubmission],
    ) -> Result<SyncReport, CoreError> {
        let mut report = SyncReport::default();

        for join in joins {
            let key_set = match study.accept_join(&join.sealed, join.expected_sequence) {
                Ok(key_set) => key_set,
                Err(_) => {
                    report.joins_rejected += 1;
                    continue;
                },
            };

            match self.persistence.add_participant(study.id(), &key_set) {
                Ok(participant) => {
                    info!(study = study.id().0, participant = participant.0, "participant enrolled");
                    report.joins_accepted += 1;
                },
                Err(err) => {
                    error!(study = study.id().0, error = %err, "failed to store new participant");
                    report.storage_failures += 1;
                },
            }
        }

        let participants = self.persistence.load_key_sets_for(study.id())?;
        self.run(participants, &mut report)?;
        Ok(report)
    }

    /// Synchronize every participant of `study`.
    ///
    /// # Errors
    ///
    /// - `Storage` if the study's key sets cannot be loaded
    /// - `TransportUnavailable` if the server cannot be reached; counters
    ///   already advanced stay advanced and persisted
    pub fn sync_study(&mut self, study: StudyId) -> Result<SyncReport, CoreError> {
        let participants = self.persistence.load_key_sets_for(study)?;
        self.sync_participants(participants)
    }

    /// Synchronize an explicit list of participants.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the server cannot be reached.
    pub fn sync_participants(
        &mut self,
        participants: Vec<(ParticipantId, KeySet)>,
    ) -> Result<SyncReport, CoreError> {
        let mut report = SyncReport::default();
        self.run(participants, &mut report)?;
        Ok(report)
    }

    fn run(
        &mut self,
        participants: Vec<(ParticipantId, KeySet)>,
        report: &mut SyncReport,
    ) -> Result<(), CoreError> {
        self.retry_revocations(&participants, report)?;

        let mut queue: VecDeque<Pending> = participants
            .into_iter()
            .map(|(participant, key_set)| Pending { participant, key_set })
            .collect();

        while !queue.is_empty() {
            if report.passes >= self.config.max_passes {
                warn!(remaining = queue.len(), passes = report.passes, "pass limit reached");
                break;
            }
            report.passes += 1;

            let batch: Vec<Pending> = queue.drain(..).collect();
            debug!(pass = report.passes, participants = batch.len(), "sync pass");

            match self.pass(batch, report) {
                Ok(requeue) => queue.extend(requeue),
                Err(StoreError::ProtocolError { reason }) => {
                    error!(pass = report.passes, reason = %reason, "sync pass aborted");
                    report.protocol_errors += 1;
                    break;
                },
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    /// Delete slots consumed by earlier runs whose revocation never got an
    /// answer.
    fn retry_revocations(
        &mut self,
        participants: &[(ParticipantId, KeySet)],
        report: &mut SyncReport,
    ) -> Result<(), CoreError> {
        let mut queued = Vec::new();
        for (participant, _) in participants {
            match self.persistence.pending_revocations(*participant) {
                Ok(slots) => queued.extend(slots.into_iter().map(|slot| (*participant, slot))),
                Err(err) => {
                    error!(participant = participant.0, error = %err, "failed to load pending revocations");
                    report.storage_failures += 1;
                },
            }
        }

        if !queued.is_empty() {
            debug!(slots = queued.len(), "retrying revocations");
        }
        match self.revoke(&queued, report) {
            Ok(()) => Ok(()),
            Err(StoreError::ProtocolError { reason }) => {
                warn!(slots = queued.len(), reason = %reason, "revocation retry failed");
                report.protocol_errors += 1;
                Ok(())
            },
            Err(err) => Err(err.into()),
        }
    }

    /// One step along every chain in `batch`. Returns the participants that
    /// may have more waiting.
    fn pass(
        &mut self,
        batch: Vec<Pending>,
        report: &mut SyncReport,
    ) -> Result<Vec<Pending>, StoreError> {
        let slots: Vec<TokenPair> = batch.iter().map(|p| generate_inbound(&p.key_set)).collect();
        let identifiers: Vec<Identifier> = slots.iter().map(|slot| slot.identifier).collect();
        let fetched = self.store.get_many(&identifiers)?;

        let mut requeue = Vec::new();
        let mut opened = Vec::new();
        let mut consumed = Vec::new();

        for ((mut pending, slot), result) in batch.into_iter().zip(slots).zip(fetched) {
            let participant = pending.participant.0;
            let value = match result {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(err) => {
                    warn!(participant, slot = %slot.identifier.short_hex(), error = %err, "slot fetch failed");
                    continue;
                },
            };

            if value == TOMBSTONE {
                if self.advance(&mut pending, None, report) {
                    debug!(participant, slot = %slot.identifier.short_hex(), "stepped over withdrawn share");
                    report.tombstones += 1;
                    requeue.push(pending);
                }
                continue;
            }

            match open_key_block(&value, &pending.key_set) {
                Ok(block) => {
                    if self.advance(&mut pending, Some(&slot), report) {
                        report.key_blocks_opened += 1;
                        consumed.push((pending.participant, slot));
                        opened.push(Opened { pending, block });
                    }
                },
                Err(err) => {
                    warn!(participant, slot = %slot.identifier.short_hex(), error = %err, "key-block rejected");
                    if self.advance(&mut pending, None, report) {
                        report.key_blocks_rejected += 1;
                    }
                },
            }
        }

        requeue.extend(self.apply(opened, report)?);
        self.revoke(&consumed, report)?;
        Ok(requeue)
    }

    /// Fetch, open and persist the data-blocks of this pass's key-blocks.
    fn apply(
        &mut self,
        opened: Vec<Opened>,
        report: &mut SyncReport,
    ) -> Result<Vec<Pending>, StoreError> {
        if opened.is_empty() {
            return Ok(Vec::new());
        }

        let identifiers: Vec<Identifier> =
            opened.iter().map(|o| o.block.content_identifier).collect();
        let fetched = self.store.get_many(&identifiers)?;

        let mut requeue = Vec::new();
        for (Opened { pending, block }, result) in opened.into_iter().zip(fetched) {
            let participant = pending.participant;
            let mut data = DataBlock::new(block.content_key, block.content_identifier).with_owner(participant);

            let ciphertext = match result {
                Ok(Some(ciphertext)) => ciphertext,
                Ok(None) => {
                    warn!(participant = participant.0, content = %data.identifier().short_hex(), "data-block missing");
                    report.content_failures += 1;
                    continue;
                },
                Err(err) => {
                    warn!(participant = participant.0, error = %err, "data-block fetch failed");
                    report.content_failures += 1;
                    continue;
                },
            };

            let item = match data.set_ciphertext(ciphertext).and_then(|()| data.open()) {
                Ok(item) => item,
                Err(err) => {
                    warn!(participant = participant.0, error = %err, "data-block rejected");
                    report.content_failures += 1;
                    continue;
                },
            };

            match self.persistence.save_content(&item) {
                Ok(()) => {
                    report.items_applied += 1;
                    requeue.push(pending);
                },
                Err(err) => {
                    error!(participant = participant.0, error = %err, "failed to store content");
                    report.storage_failures += 1;
                },
            }
        }

        Ok(requeue)
    }

    /// Delete consumed key-block slots in one batch.
    ///
    /// Every per-slot answer is final and clears the slot from the queue; a
    /// failed batch leaves the whole queue for the next run.
    fn revoke(
        &mut self,
        consumed: &[(ParticipantId, TokenPair)],
        report: &mut SyncReport,
    ) -> Result<(), StoreError> {
        if consumed.is_empty() {
            return Ok(());
        }

        let slots: Vec<TokenPair> = consumed.iter().map(|(_, slot)| *slot).collect();
        let results = self.store.delete_many(&slots)?;

        for ((participant, slot), result) in consumed.iter().zip(results) {
            match result {
                Ok(DeleteOutcome::Deleted | DeleteOutcome::NotFound) => report.revoked += 1,
                Err(err) => {
                    warn!(slot = %slot.identifier.short_hex(), error = %err, "revocation refused");
                },
            }
            if let Err(err) = self.persistence.clear_revocations(*participant, &[*slot]) {
                error!(participant = participant.0, error = %err, "failed to clear revocation");
                report.storage_failures += 1;
            }
        }
        Ok(())
    }

    /// Step the inbound chain of `pending`, queueing `consumed` for
    /// revocation when given. `false` drops the participant from this run.
    fn advance(
        &self,
        pending: &mut Pending,
        consumed: Option<&TokenPair>,
        report: &mut SyncReport,
    ) -> bool {
        let participant = pending.participant;
        let expected = *pending.key_set.inbound_counter();

        let persisted = match consumed {
            Some(slot) => self.persistence.consume_slot(participant, &expected, slot),
            None => self.persistence.advance_counter(participant, Direction::Inbound, &expected),
        };

        match persisted {
            Ok(()) => {
                notify_used(&mut pending.key_set, Direction::Inbound);
                true
            },
            Err(PersistenceError::CounterMoved { .. }) => {
                warn!(participant = participant.0, "inbound counter moved by another run, skipping");
                report.counter_conflicts += 1;
                false
            },
            Err(err) => {
                error!(participant = participant.0, error = %err, "failed to persist counter advance");
                report.storage_failures += 1;
                false
            },
        }
    }
}
