//! Protocol core of quietbox: enrollment, publishing and mailbox
//! synchronization against an untrusted key-value server.
//!
//! # Architecture
//!
//! ```text
//!  Study ──accept_join──► KeySet ──► Persistence
//!                                        │ load_key_sets_for
//!                                        ▼
//!  Publisher::share ──put──►  server  ◄──get-many / delete-many── Synchronizer
//!        │                       ▲                                   │
//!        └──── StoreClient ──────┴────────── StoreClient ────────────┘
//!                  │ MembershipFilter consulted before every fetch
//!                  ▼
//!              Transport (request bytes ─► reply bytes)
//! ```
//!
//! Collaborators are traits: [`transport::Transport`] moves bytes,
//! [`filter::MembershipFilter`] answers "could this identifier exist",
//! [`persistence::Persistence`] stores key sets and received content, and
//! [`env::Environment`] supplies randomness. The core itself is synchronous
//! and holds no global state. Counters are advanced by compare-and-swap in
//! persistence, one direction at a time, before any in-memory copy changes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod data;
pub mod env;
pub mod error;
pub mod filter;
pub mod mailbox;
pub mod persistence;
pub mod publish;
pub mod store;
pub mod study;
pub mod transport;

pub use config::SyncConfig;
pub use data::{DataBlock, Granularity, ParticipantId, Shareable, ShareableKind, StudyId};
pub use env::{EnvRng, Environment, SystemEnv};
pub use error::CoreError;
pub use filter::{IdentifierSetFilter, MembershipFilter, NoFilter};
pub use mailbox::{SyncReport, Synchronizer};
pub use persistence::{MemoryPersistence, PendingShare, Persistence, PersistenceError};
pub use publish::{Publisher, ShareReceipt};
pub use store::{DeleteOutcome, StoreClient, StoreError};
pub use study::{JoinRequest, JoinSubmission, Study, StudyInvitation};
pub use transport::{TcpTransport, Transport};
