//! Quietbox mailbox server.
//!
//! An untrusted key-value store addressed by pseudonymous identifiers. It
//! never sees keys or plaintext: values are opaque, identifiers are hashes,
//! and deletes are authorized by presenting the identifier's preimage.
//!
//! # Components
//!
//! - [`MailboxServer`]: request handler (pure logic, no I/O)
//! - [`Server`]: Tokio TCP runtime framing requests for the handler
//! - [`storage`]: backend trait with in-memory and fault-injecting
//!   implementations

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod error;
mod handler;
mod runtime;
pub mod storage;

pub use config::ServerConfig;
pub use error::ServerError;
pub use handler::MailboxServer;
pub use runtime::Server;
pub use storage::{ChaoticStorage, MailboxStorage, MemoryStorage, StorageError};
