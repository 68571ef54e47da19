//! Fuzz target for key-block opening
//!
//! Arbitrary slot contents under an arbitrary key set must never panic and
//! must never open unless they were sealed under that key set.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use quietbox_crypto::{
    Counter, KeyBlock, KeySet, Secret,
    key_block::{open_key_block, seal_key_block},
};
use quietbox_proto::Identifier;

#[derive(Debug, Arbitrary)]
struct Input {
    inbound_key: [u8; 32],
    inbound_counter: [u8; 32],
    content_key: [u8; 32],
    content_identifier: [u8; 32],
    slot: Vec<u8>,
    flip: Option<(u8, u8)>,
}

fuzz_target!(|input: Input| {
    // Both ends of one relationship: the reader's inbound is the writer's outbound
    let reader = KeySet::new(
        Secret::from_bytes(input.inbound_key),
        Secret::from_bytes([0; 32]),
        Counter::from_bytes(input.inbound_counter),
        Counter::from_bytes([0; 32]),
        true,
    );
    let writer = KeySet::new(
        Secret::from_bytes([0; 32]),
        Secret::from_bytes(input.inbound_key),
        Counter::from_bytes([0; 32]),
        Counter::from_bytes(input.inbound_counter),
        false,
    );

    // Noise should not open
    let _ = open_key_block(&input.slot, &reader);

    let block = KeyBlock {
        content_key: Secret::from_bytes(input.content_key),
        content_identifier: Identifier::from_bytes(input.content_identifier),
    };
    let mut sealed = seal_key_block(&block, &writer);
    assert_eq!(open_key_block(&sealed, &reader).expect("sealed block opens"), block);

    if let Some((index, mask)) = input.flip
        && mask != 0
    {
        let index = usize::from(index) % sealed.len();
        sealed[index] ^= mask;
        assert!(open_key_block(&sealed, &reader).is_err(), "tampered block opened");
    }
});
