//! Store request and response messages.
//!
//! Keys travel as raw byte strings rather than [`Identifier`]s so that a
//! malformed key reaches the server and is answered with
//! [`GetReply::BadKeyFormat`] instead of failing the whole message.

use serde::{Deserialize, Serialize};

use crate::{
    cbor,
    errors::Result,
    ids::{Identifier, TokenPair},
};

/// Maximum encoded message size (16 MiB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Value written over a revoked identifier so that a late writer cannot
/// resurrect it.
pub const TOMBSTONE: &[u8] = &[0x42];

/// Client to server request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Fetch one value
    Get {
        /// Identifier to look up
        #[serde(with = "serde_bytes")]
        identifier: Vec<u8>,
    },
    /// Fetch several values; replies are in request order
    GetMany {
        /// Identifiers to look up
        identifiers: Vec<Vec<u8>>,
    },
    /// Store one value if the identifier is free
    Put {
        /// Identifier to store under
        #[serde(with = "serde_bytes")]
        identifier: Vec<u8>,
        /// Opaque value
        #[serde(with = "serde_bytes")]
        value: Vec<u8>,
    },
    /// Store several values
    PutMany {
        /// Values to store
        entries: Vec<PutEntry>,
    },
    /// Delete one value, authorized by its revocation token
    Delete {
        /// Identifier to delete
        #[serde(with = "serde_bytes")]
        identifier: Vec<u8>,
        /// Preimage of `identifier`
        #[serde(with = "serde_bytes")]
        revocation: Vec<u8>,
    },
    /// Delete several values
    DeleteMany {
        /// Identifier/token pairs to delete
        tokens: Vec<DeleteEntry>,
    },
}

/// One element of [`Request::PutMany`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutEntry {
    /// Identifier to store under
    #[serde(with = "serde_bytes")]
    pub identifier: Vec<u8>,
    /// Opaque value
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

impl PutEntry {
    /// Entry storing `value` under `identifier`.
    pub fn new(identifier: &Identifier, value: Vec<u8>) -> Self {
        Self { identifier: identifier.as_bytes().to_vec(), value }
    }
}

/// One element of [`Request::DeleteMany`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEntry {
    /// Identifier to delete
    #[serde(with = "serde_bytes")]
    pub identifier: Vec<u8>,
    /// Preimage of `identifier`
    #[serde(with = "serde_bytes")]
    pub revocation: Vec<u8>,
}

impl From<&TokenPair> for DeleteEntry {
    fn from(pair: &TokenPair) -> Self {
        Self {
            identifier: pair.identifier.as_bytes().to_vec(),
            revocation: pair.revocation.as_bytes().to_vec(),
        }
    }
}

impl Request {
    /// `Get` for a typed identifier.
    pub fn get(identifier: &Identifier) -> Self {
        Self::Get { identifier: identifier.as_bytes().to_vec() }
    }

    /// `GetMany` for typed identifiers.
    pub fn get_many<'a>(identifiers: impl IntoIterator<Item = &'a Identifier>) -> Self {
        Self::GetMany { identifiers: identifiers.into_iter().map(|i| i.as_bytes().to_vec()).collect() }
    }

    /// `Put` for a typed identifier.
    pub fn put(identifier: &Identifier, value: Vec<u8>) -> Self {
        Self::Put { identifier: identifier.as_bytes().to_vec(), value }
    }

    /// `Delete` authorized by a token pair.
    pub fn delete(pair: &TokenPair) -> Self {
        let entry = DeleteEntry::from(pair);
        Self::Delete { identifier: entry.identifier, revocation: entry.revocation }
    }

    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "get",
            Self::GetMany { .. } => "get-many",
            Self::Put { .. } => "put",
            Self::PutMany { .. } => "put-many",
            Self::Delete { .. } => "delete",
            Self::DeleteMany { .. } => "delete-many",
        }
    }

    /// Encode as CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        cbor::to_vec(self)
    }

    /// Decode from CBOR.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MessageTooLarge` above [`MAX_MESSAGE_SIZE`]
    /// - `ProtocolError::CborDecode` for malformed input
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        cbor::from_slice(bytes)
    }
}

/// Outcome of a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GetReply {
    /// Value stored under the identifier
    Value(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Nothing stored under the identifier
    Empty,
    /// Identifier was not [`crate::TOKEN_SIZE`] bytes
    BadKeyFormat,
    /// Server-side failure
    Failed,
}

/// Outcome of a single store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutReply {
    /// Value stored
    Ok,
    /// Identifier already holds a value
    KeyTaken,
    /// Identifier was not [`crate::TOKEN_SIZE`] bytes
    BadKeyFormat,
    /// Server-side failure
    Failed,
}

/// Outcome of a single delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteReply {
    /// Value deleted
    Ok,
    /// Nothing stored under the identifier
    NotFound,
    /// Identifier or token was not [`crate::TOKEN_SIZE`] bytes
    BadKeyFormat,
    /// Token does not hash to the identifier
    AuthFailed,
    /// Server-side failure
    Failed,
}

/// Server to client response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Reply to [`Request::Get`]
    Get(GetReply),
    /// Replies to [`Request::GetMany`], in request order
    GetMany(Vec<GetReply>),
    /// Reply to [`Request::Put`]
    Put(PutReply),
    /// Replies to [`Request::PutMany`], in request order
    PutMany(Vec<PutReply>),
    /// Reply to [`Request::Delete`]
    Delete(DeleteReply),
    /// Replies to [`Request::DeleteMany`], in request order
    DeleteMany(Vec<DeleteReply>),
    /// The request could not be processed at all
    Error {
        /// Human-readable reason
        message: String,
    },
}

impl Response {
    /// Encode as CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        cbor::to_vec(self)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        cbor::from_slice(bytes)
    }
}
