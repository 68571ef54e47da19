//! Chaos property tests for the request handler
//!
//! With storage failing at random, every reply must still be well-formed and
//! the surviving state must be exactly what the successful replies claim:
//! - A put answered `Ok` is readable afterwards
//! - A put answered `Failed` left nothing behind
//! - A delete answered `Ok` removed the value

use std::collections::HashMap;

use proptest::prelude::*;
use quietbox_crypto::derivation::identifier_for;
use quietbox_proto::{
    DeleteReply, GetReply, Identifier, PutReply, Request, Response, RevocationToken, TokenPair,
};
use quietbox_server::{ChaoticStorage, MailboxServer, MailboxStorage, MemoryStorage};

fn pair(index: u8) -> TokenPair {
    let revocation = RevocationToken::from_bytes([index; 32]);
    TokenPair::new(identifier_for(&revocation), revocation)
}

#[test]
fn prop_chaos_replies_match_state() {
    proptest!(|(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        ops in prop::collection::vec((0u8..3, 0u8..16), 10..200),
    )| {
        let storage = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
        let server = MailboxServer::new(storage.clone());
        let mut model: HashMap<Identifier, Vec<u8>> = HashMap::new();

        for (op, index) in ops {
            let pair = pair(index);
            match op {
                0 => {
                    let value = vec![index, op];
                    match server.handle(Request::put(&pair.identifier, value.clone())) {
                        Response::Put(PutReply::Ok) => {
                            prop_assert!(!model.contains_key(&pair.identifier));
                            model.insert(pair.identifier, value);
                        },
                        Response::Put(PutReply::KeyTaken) => {
                            prop_assert!(model.contains_key(&pair.identifier));
                        },
                        Response::Put(PutReply::Failed) => {},
                        other => prop_assert!(false, "unexpected put reply {other:?}"),
                    }
                },
                1 => match server.handle(Request::delete(&pair)) {
                    Response::Delete(DeleteReply::Ok) => {
                        prop_assert!(model.remove(&pair.identifier).is_some());
                    },
                    Response::Delete(DeleteReply::NotFound) => {
                        prop_assert!(!model.contains_key(&pair.identifier));
                    },
                    Response::Delete(DeleteReply::Failed) => {},
                    other => prop_assert!(false, "unexpected delete reply {other:?}"),
                },
                _ => match server.handle(Request::get(&pair.identifier)) {
                    Response::Get(GetReply::Value(value)) => {
                        prop_assert_eq!(Some(&value), model.get(&pair.identifier));
                    },
                    Response::Get(GetReply::Empty) => {
                        prop_assert!(!model.contains_key(&pair.identifier));
                    },
                    Response::Get(GetReply::Failed) => {},
                    other => prop_assert!(false, "unexpected get reply {other:?}"),
                },
            }
        }

        let inner = storage.inner();
        prop_assert_eq!(inner.len().unwrap(), model.len());
        for (identifier, value) in &model {
            let stored = inner.get(identifier).unwrap();
            prop_assert_eq!(stored.as_ref(), Some(value));
        }
    });
}

#[test]
fn prop_forged_tokens_never_delete() {
    proptest!(|(
        owner in any::<[u8; 32]>(),
        forged in any::<[u8; 32]>(),
    )| {
        prop_assume!(owner != forged);

        let server = MailboxServer::new(MemoryStorage::new());
        let owner = RevocationToken::from_bytes(owner);
        let identifier = identifier_for(&owner);
        server.handle(Request::put(&identifier, vec![1]));

        let attempt = TokenPair::new(identifier, RevocationToken::from_bytes(forged));
        prop_assert_eq!(server.handle(Request::delete(&attempt)), Response::Delete(DeleteReply::AuthFailed));
        prop_assert!(server.storage().contains(&identifier));
    });
}

#[test]
fn prop_operation_count_is_linear() {
    proptest!(|(count in 1usize..200)| {
        let storage = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        let server = MailboxServer::new(storage.clone());

        let ids: Vec<Identifier> = (0..count).map(|i| pair(i as u8).identifier).collect();
        server.handle(Request::get_many(&ids));

        prop_assert_eq!(storage.operation_count(), count);
    });
}
