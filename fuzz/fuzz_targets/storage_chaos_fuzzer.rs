//! Fuzz target for the mailbox server under storage failures
//!
//! Drives the request handler with arbitrary puts, gets and deletes over a
//! `ChaoticStorage` backend and checks every reply against a model map.
//!
//! # Invariants
//!
//! - A failed backend operation is reported as `Failed` and changes nothing
//! - A stored value is never overwritten
//! - A forged revocation token never deletes anything
//! - Replies never disagree with the model

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use quietbox_crypto::derivation::identifier_for;
use quietbox_proto::{DeleteReply, GetReply, PutReply, Request, Response, RevocationToken, TokenPair};
use quietbox_server::{ChaoticStorage, MailboxServer, MemoryStorage};

#[derive(Debug, Arbitrary)]
struct Scenario {
    chaos_seed: u64,
    /// 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    Put { slot: u8, value: Vec<u8> },
    Get { slot: u8 },
    Delete { slot: u8, forged: bool },
}

fn slot_pair(slot: u8) -> TokenPair {
    let revocation = RevocationToken::from_bytes([slot; 32]);
    TokenPair { identifier: identifier_for(&revocation), revocation }
}

fuzz_target!(|scenario: Scenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let storage = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, scenario.chaos_seed);
    let server = MailboxServer::new(storage);
    let mut model: HashMap<u8, Vec<u8>> = HashMap::new();

    for operation in scenario.operations.into_iter().take(256) {
        match operation {
            Operation::Put { slot, value } => {
                let pair = slot_pair(slot);
                match server.handle(Request::put(&pair.identifier, value.clone())) {
                    Response::Put(PutReply::Ok) => {
                        assert!(model.insert(slot, value).is_none(), "overwrote slot {slot}");
                    },
                    Response::Put(PutReply::KeyTaken) => assert!(model.contains_key(&slot)),
                    Response::Put(PutReply::Failed) => {},
                    other => panic!("unexpected put reply {other:?}"),
                }
            },
            Operation::Get { slot } => {
                let pair = slot_pair(slot);
                match server.handle(Request::get(&pair.identifier)) {
                    Response::Get(GetReply::Value(value)) => assert_eq!(model.get(&slot), Some(&value)),
                    Response::Get(GetReply::Empty) => assert!(!model.contains_key(&slot)),
                    Response::Get(GetReply::Failed) => {},
                    other => panic!("unexpected get reply {other:?}"),
                }
            },
            Operation::Delete { slot, forged } => {
                let mut pair = slot_pair(slot);
                if forged {
                    pair.revocation = RevocationToken::from_bytes([slot.wrapping_add(1); 32]);
                }
                match server.handle(Request::delete(&pair)) {
                    Response::Delete(DeleteReply::Ok) => {
                        assert!(!forged, "forged token deleted slot {slot}");
                        assert!(model.remove(&slot).is_some());
                    },
                    Response::Delete(DeleteReply::NotFound) => assert!(!model.contains_key(&slot)),
                    Response::Delete(DeleteReply::AuthFailed) => assert!(forged),
                    Response::Delete(DeleteReply::Failed) => {},
                    other => panic!("unexpected delete reply {other:?}"),
                }
            },
        }
    }
});
