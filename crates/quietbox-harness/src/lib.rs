//! Deterministic in-process harness for quietbox protocol testing.
//!
//! Clients talk to a real [`quietbox_server::MailboxServer`] through
//! [`LoopbackTransport`] without sockets, draw randomness from a seeded
//! [`SeededEnv`], and persist through wrappers that fail on command. The
//! scenario tests under `tests/` run full enrollment, publishing and
//! synchronization flows on top of these pieces.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod failing;
pub mod fixtures;
pub mod loopback;
pub mod seeded_env;

pub use failing::FailingPersistence;
pub use fixtures::{establish_relationship, join, sample_item};
pub use loopback::LoopbackTransport;
pub use seeded_env::SeededEnv;
