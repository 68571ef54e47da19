//! Wire types for the quietbox mailbox protocol.
//!
//! Everything the untrusted mailbox server and its clients exchange is defined
//! here: fixed-size pseudonymous identifiers, the store request/response
//! messages and the binary header of the hybrid envelope.
//!
//! # Layout
//!
//! ```text
//! Store message:   CBOR(Request) / CBOR(Response)
//!
//! Hybrid envelope: +---------+-----------+----------+-------------+
//!                  | version | algorithm | sequence | wrapped len |   10 bytes
//!                  |   u8    |    u8     |  u32 BE  |   u32 BE    |
//!                  +---------+-----------+----------+-------------+
//!                  | wrapped one-time key | nonce | ciphertext+tag |
//!                  +----------------------+-------+----------------+
//! ```
//!
//! The crate performs no cryptography. Identifiers are opaque 32-byte values;
//! their derivation lives in `quietbox-crypto`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cbor;
pub mod errors;
pub mod header;
pub mod ids;
pub mod messages;

pub use errors::{ProtocolError, Result};
pub use header::HybridHeader;
pub use ids::{Identifier, RevocationToken, TOKEN_SIZE, TokenPair};
pub use messages::{
    DeleteEntry, DeleteReply, GetReply, MAX_MESSAGE_SIZE, PutEntry, PutReply, Request, Response,
    TOMBSTONE,
};
