//! Enrollment, publishing and synchronization through a real server handler.
//!
//! Each test builds a study with one enrolled participant, lets the
//! participant publish over a loopback link and checks what the researcher's
//! synchronizer recovers:
//! - Pending items drain in one call and their key-block slots are deleted
//! - Withdrawn shares and noise are stepped over without stalling the chain
//! - Transport and persistence failures never advance a counter silently
//! - An interrupted share is finished with the same ciphertext it started with

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex},
};

use quietbox_core::{
    CoreError, IdentifierSetFilter, MemoryPersistence, NoFilter, ParticipantId, Persistence,
    Publisher, StoreClient, Study, StudyId, SyncConfig, SyncReport, Synchronizer, Transport,
};
use quietbox_crypto::{KeySet, derivation::generate_outbound, hybrid::MIN_RSA_BITS};
use quietbox_harness::{FailingPersistence, LoopbackTransport, SeededEnv, join, sample_item};
use quietbox_proto::Request;
use quietbox_server::MailboxStorage;

const STUDY: StudyId = StudyId(1);

struct World {
    env: SeededEnv,
    link: LoopbackTransport,
    researcher: MemoryPersistence,
    participant_store: MemoryPersistence,
    participant: ParticipantId,
}

impl World {
    fn new(seed: u64) -> Self {
        let env = SeededEnv::new(seed);
        let link = LoopbackTransport::new();
        let mut study = Study::create(STUDY, "sleep", &env, MIN_RSA_BITS).unwrap();
        let researcher = MemoryPersistence::new();

        let (submission, participant_keys) = join(&study, &env, 0).unwrap();
        let report = synchronizer(&link, researcher.clone()).update_study(&mut study, &[submission]).unwrap();
        assert_eq!(report.joins_accepted, 1);

        let participant_store = MemoryPersistence::new();
        let participant = participant_store.add_participant(STUDY, &participant_keys).unwrap();

        Self { env, link, researcher, participant_store, participant }
    }

    fn publish(&self, items: impl IntoIterator<Item = u8>) {
        let mut publisher = Publisher::new(
            StoreClient::new(self.link.clone()),
            self.participant_store.clone(),
            self.env.clone(),
            SyncConfig::default(),
        );
        for n in items {
            publisher.share(self.participant, &sample_item(n)).unwrap();
        }
    }

    fn participant_keys(&self) -> KeySet {
        self.participant_store.key_set(self.participant).unwrap()
    }

    fn researcher_keys(&self) -> KeySet {
        let mut loaded = self.researcher.load_key_sets_for(STUDY).unwrap();
        assert_eq!(loaded.len(), 1);
        loaded.remove(0).1
    }

    fn stored_values(&self) -> usize {
        self.link.server().storage().len().unwrap()
    }
}

/// Forwards to a loopback link and remembers every put it carried.
#[derive(Clone)]
struct RecordingTransport {
    link: LoopbackTransport,
    puts: Arc<Mutex<Vec<(Vec<u8>, Vec<u8>)>>>,
}

impl RecordingTransport {
    fn new(link: LoopbackTransport) -> Self {
        Self { link, puts: Arc::default() }
    }

    fn values_by_identifier(&self) -> HashMap<Vec<u8>, Vec<Vec<u8>>> {
        let mut grouped: HashMap<Vec<u8>, Vec<Vec<u8>>> = HashMap::new();
        for (identifier, value) in self.puts.lock().unwrap().iter() {
            grouped.entry(identifier.clone()).or_default().push(value.clone());
        }
        grouped
    }
}

impl Transport for RecordingTransport {
    fn transceive(&mut self, request: &[u8]) -> io::Result<Vec<u8>> {
        if let Ok(Request::Put { identifier, value }) = Request::decode(request) {
            self.puts.lock().unwrap().push((identifier, value));
        }
        self.link.transceive(request)
    }
}

fn synchronizer<P: Persistence>(
    link: &LoopbackTransport,
    persistence: P,
) -> Synchronizer<LoopbackTransport, NoFilter, P> {
    Synchronizer::new(StoreClient::new(link.clone()), persistence, SyncConfig::default())
}

#[test]
fn mailbox_drains_fully_in_one_call() {
    let world = World::new(10);
    world.publish(0..3);
    assert_eq!(world.stored_values(), 6);

    let report = synchronizer(&world.link, world.researcher.clone()).sync_study(STUDY).unwrap();

    assert_eq!(report.items_applied, 3);
    assert_eq!(report.revoked, 3);
    let descriptions: Vec<String> =
        world.researcher.content().into_iter().map(|item| item.description).collect();
    assert_eq!(descriptions, ["day 0", "day 1", "day 2"]);

    // Only the three data-blocks remain
    assert_eq!(world.stored_values(), 3);
    let again = synchronizer(&world.link, world.researcher.clone()).sync_study(STUDY).unwrap();
    assert_eq!(again, SyncReport { passes: 1, ..SyncReport::default() });
}

#[test]
fn content_is_attributed_to_its_relationship() {
    let world = World::new(11);
    world.publish([7]);

    synchronizer(&world.link, world.researcher.clone()).sync_study(STUDY).unwrap();

    let (researcher_side, _) = world.researcher.load_key_sets_for(STUDY).unwrap()[0].clone();
    assert_eq!(world.researcher.content()[0].owner, Some(researcher_side));
}

#[test]
fn withdrawn_share_is_stepped_over() {
    let world = World::new(12);
    let mut publisher = Publisher::new(
        StoreClient::new(world.link.clone()),
        world.participant_store.clone(),
        world.env.clone(),
        SyncConfig::default(),
    );
    let first = publisher.share(world.participant, &sample_item(1)).unwrap();
    publisher.share(world.participant, &sample_item(2)).unwrap();
    publisher.withdraw(&first).unwrap();

    let report = synchronizer(&world.link, world.researcher.clone()).sync_study(STUDY).unwrap();

    assert_eq!(report.tombstones, 1);
    assert_eq!(report.items_applied, 1);
    assert_eq!(world.researcher.content()[0].description, "day 2");
}

#[test]
fn noise_in_a_slot_is_skipped_by_both_sides() {
    let world = World::new(13);

    let squatted = generate_outbound(&world.participant_keys());
    StoreClient::new(world.link.clone()).put(&squatted.identifier, vec![0xEE; 80]).unwrap();

    // The publisher finds its slot taken and moves past it
    world.publish([4]);

    let mut sync = synchronizer(&world.link, world.researcher.clone());
    let first = sync.sync_study(STUDY).unwrap();
    assert_eq!(first.key_blocks_rejected, 1);
    assert_eq!(first.items_applied, 0);

    let second = sync.sync_study(STUDY).unwrap();
    assert_eq!(second.items_applied, 1);
    assert_eq!(world.researcher_keys().inbound_counter(), world.participant_keys().outbound_counter());
}

#[test]
fn transport_outage_is_retryable_and_loses_nothing() {
    let world = World::new(14);
    world.publish(0..2);
    let before = world.researcher_keys();

    world.link.set_online(false);
    let err = synchronizer(&world.link, world.researcher.clone()).sync_study(STUDY).unwrap_err();
    assert!(matches!(err, CoreError::TransportUnavailable { .. }));
    assert!(err.is_retryable());
    assert_eq!(world.researcher_keys(), before);

    world.link.set_online(true);
    let report = synchronizer(&world.link, world.researcher.clone()).sync_study(STUDY).unwrap();
    assert_eq!(report.items_applied, 2);
}

#[test]
fn persistence_failure_does_not_advance() {
    let world = World::new(15);
    world.publish([1]);
    let before = world.researcher_keys();

    let failing = FailingPersistence::new(world.researcher.clone());
    failing.fail_counters(true);
    let report = synchronizer(&world.link, failing.clone()).sync_study(STUDY).unwrap();

    assert_eq!(report.storage_failures, 1);
    assert_eq!(report.items_applied, 0);
    assert_eq!(world.researcher_keys(), before);
    assert_eq!(world.stored_values(), 2);

    failing.fail_counters(false);
    let report = synchronizer(&world.link, failing).sync_study(STUDY).unwrap();
    assert_eq!(report.items_applied, 1);
}

#[test]
fn negative_filter_answer_skips_the_server() {
    let world = World::new(16);
    world.publish([1]);
    let requests = world.link.request_count();

    let mut sync = Synchronizer::new(
        StoreClient::with_filter(world.link.clone(), IdentifierSetFilter::new()),
        world.researcher.clone(),
        SyncConfig::default(),
    );
    let report = sync.sync_study(STUDY).unwrap();

    assert_eq!(report.items_applied, 0);
    assert_eq!(world.link.request_count(), requests);
}

#[test]
fn every_participant_is_drained() {
    let env = SeededEnv::new(17);
    let link = LoopbackTransport::new();
    let mut study = Study::create(STUDY, "steps", &env, MIN_RSA_BITS).unwrap();
    let researcher = MemoryPersistence::new();

    let mut participants = Vec::new();
    let mut submissions = Vec::new();
    for sequence in 0..3 {
        let (submission, keys) = join(&study, &env, sequence).unwrap();
        submissions.push(submission);
        participants.push(keys);
    }

    let mut sync = synchronizer(&link, researcher.clone());
    let enrolled = sync.update_study(&mut study, &submissions).unwrap();
    assert_eq!(enrolled.joins_accepted, 3);

    for keys in &participants {
        let store = MemoryPersistence::new();
        let id = store.add_participant(STUDY, keys).unwrap();
        let mut publisher =
            Publisher::new(StoreClient::new(link.clone()), store, env.clone(), SyncConfig::default());
        publisher.share(id, &sample_item(1)).unwrap();
        publisher.share(id, &sample_item(2)).unwrap();
    }

    let report = sync.sync_study(STUDY).unwrap();
    assert_eq!(report.items_applied, 6);
    assert_eq!(report.passes, 3);
}

#[test]
fn join_with_unexpected_sequence_is_rejected() {
    let env = SeededEnv::new(18);
    let link = LoopbackTransport::new();
    let mut study = Study::create(STUDY, "sleep", &env, MIN_RSA_BITS).unwrap();
    let researcher = MemoryPersistence::new();

    let (mut submission, _) = join(&study, &env, 5).unwrap();
    submission.expected_sequence = Some(6);

    let report = synchronizer(&link, researcher.clone()).update_study(&mut study, &[submission]).unwrap();
    assert_eq!(report.joins_rejected, 1);
    assert!(researcher.load_key_sets_for(STUDY).unwrap().is_empty());
}

#[test]
fn share_retried_after_failed_advance_reuses_its_ciphertext() {
    let world = World::new(19);
    let recorder = RecordingTransport::new(world.link.clone());
    let failing = FailingPersistence::new(world.participant_store.clone());
    let mut publisher =
        Publisher::new(StoreClient::new(recorder.clone()), failing.clone(), world.env.clone(), SyncConfig::default());
    let before = world.participant_keys();

    failing.refuse_next_counters(1);
    let err = publisher.share(world.participant, &sample_item(1)).unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));
    assert_eq!(world.participant_keys(), before);
    // the key-block may be live, so its data-block stays
    assert_eq!(world.stored_values(), 2);

    publisher.share(world.participant, &sample_item(2)).unwrap();

    for values in recorder.values_by_identifier().values() {
        assert!(values.iter().all(|value| *value == values[0]));
    }

    let report = synchronizer(&world.link, world.researcher.clone()).sync_study(STUDY).unwrap();
    assert_eq!(report.items_applied, 2);
    let descriptions: Vec<String> =
        world.researcher.content().into_iter().map(|item| item.description).collect();
    assert_eq!(descriptions, ["day 1", "day 2"]);
    assert_eq!(world.researcher_keys().inbound_counter(), world.participant_keys().outbound_counter());
}

#[test]
fn sync_and_share_on_one_store_keep_both_chains() {
    let world = World::new(20);
    let researcher_side = world.researcher.load_key_sets_for(STUDY).unwrap()[0].0;
    let mut to_participant = Publisher::new(
        StoreClient::new(world.link.clone()),
        world.researcher.clone(),
        world.env.clone(),
        SyncConfig::default(),
    );
    let loaded_before_sync = world.participant_keys();

    to_participant.share(researcher_side, &sample_item(1)).unwrap();
    let first = synchronizer(&world.link, world.participant_store.clone()).sync_study(STUDY).unwrap();
    assert_eq!(first.items_applied, 1);

    // the participant shares after its inbound chain moved
    world.publish([2]);
    let after = world.participant_keys();
    assert_ne!(after.inbound_counter(), loaded_before_sync.inbound_counter());
    assert_ne!(after.outbound_counter(), loaded_before_sync.outbound_counter());

    to_participant.share(researcher_side, &sample_item(3)).unwrap();
    let second = synchronizer(&world.link, world.participant_store.clone()).sync_study(STUDY).unwrap();
    assert_eq!(second.items_applied, 1);
    let received: Vec<String> =
        world.participant_store.content().into_iter().map(|item| item.description).collect();
    assert_eq!(received, ["day 1", "day 3"]);

    let report = synchronizer(&world.link, world.researcher.clone()).sync_study(STUDY).unwrap();
    assert_eq!(report.items_applied, 1);
    assert_eq!(world.researcher.content()[0].description, "day 2");
}
