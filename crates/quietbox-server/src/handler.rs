//! Request handling.
//!
//! The server sees only identifiers, opaque values and revocation tokens. It
//! enforces three rules: keys are exactly 32 bytes, values are write-once, and
//! a delete must present the preimage of the identifier it removes.

use quietbox_crypto::derivation::verify_pair;
use quietbox_proto::{
    DeleteEntry, DeleteReply, GetReply, Identifier, PutEntry, PutReply, Request, Response,
    RevocationToken,
};
use tracing::{debug, error};

use crate::{config::ServerConfig, error::ServerError, storage::MailboxStorage};

/// Stateless request handler over a shared storage backend.
#[derive(Clone)]
pub struct MailboxServer<S: MailboxStorage> {
    storage: S,
    max_batch: usize,
}

impl<S: MailboxStorage> MailboxServer<S> {
    /// Handler over `storage` with default limits.
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, &ServerConfig::default())
    }

    /// Handler over `storage` with the limits of `config`.
    pub fn with_config(storage: S, config: &ServerConfig) -> Self {
        Self { storage, max_batch: config.max_batch }
    }

    /// The storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Decode a request, handle it and encode the response.
    ///
    /// An undecodable request is answered with [`Response::Error`] rather
    /// than failing the connection.
    ///
    /// # Errors
    ///
    /// `Protocol` if the response cannot be encoded.
    pub fn handle_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, ServerError> {
        let response = match Request::decode(bytes) {
            Ok(request) => self.handle(request),
            Err(err) => {
                debug!(error = %err, "undecodable request");
                Response::Error { message: err.to_string() }
            },
        };

        response.encode().map_err(|e| ServerError::Protocol(e.to_string()))
    }

    /// Handle one request.
    pub fn handle(&self, request: Request) -> Response {
        if let Some(size) = batch_size(&request)
            && size > self.max_batch
        {
            return Response::Error {
                message: format!("batch of {size} exceeds limit of {}", self.max_batch),
            };
        }

        match request {
            Request::Get { identifier } => Response::Get(self.get(&identifier)),
            Request::GetMany { identifiers } => {
                Response::GetMany(identifiers.iter().map(|id| self.get(id)).collect())
            },
            Request::Put { identifier, value } => Response::Put(self.put(&identifier, &value)),
            Request::PutMany { entries } => Response::PutMany(
                entries.iter().map(|PutEntry { identifier, value }| self.put(identifier, value)).collect(),
            ),
            Request::Delete { identifier, revocation } => {
                Response::Delete(self.delete(&identifier, &revocation))
            },
            Request::DeleteMany { tokens } => Response::DeleteMany(
                tokens
                    .iter()
                    .map(|DeleteEntry { identifier, revocation }| self.delete(identifier, revocation))
                    .collect(),
            ),
        }
    }

    fn get(&self, raw: &[u8]) -> GetReply {
        let Ok(identifier) = Identifier::from_slice(raw) else {
            return GetReply::BadKeyFormat;
        };

        match self.storage.get(&identifier) {
            Ok(Some(value)) => GetReply::Value(value),
            Ok(None) => GetReply::Empty,
            Err(err) => {
                error!(id = %identifier.short_hex(), error = %err, "storage read failed");
                GetReply::Failed
            },
        }
    }

    fn put(&self, raw: &[u8], value: &[u8]) -> PutReply {
        let Ok(identifier) = Identifier::from_slice(raw) else {
            return PutReply::BadKeyFormat;
        };

        match self.storage.insert_if_absent(&identifier, value) {
            Ok(true) => PutReply::Ok,
            Ok(false) => PutReply::KeyTaken,
            Err(err) => {
                error!(id = %identifier.short_hex(), error = %err, "storage write failed");
                PutReply::Failed
            },
        }
    }

    fn delete(&self, raw_identifier: &[u8], raw_revocation: &[u8]) -> DeleteReply {
        let (Ok(identifier), Ok(revocation)) =
            (Identifier::from_slice(raw_identifier), RevocationToken::from_slice(raw_revocation))
        else {
            return DeleteReply::BadKeyFormat;
        };

        // Checked before touching storage so the reply does not reveal
        // whether the identifier exists.
        if !verify_pair(&identifier, &revocation) {
            debug!(id = %identifier.short_hex(), "revocation token rejected");
            return DeleteReply::AuthFailed;
        }

        match self.storage.remove(&identifier) {
            Ok(true) => DeleteReply::Ok,
            Ok(false) => DeleteReply::NotFound,
            Err(err) => {
                error!(id = %identifier.short_hex(), error = %err, "storage delete failed");
                DeleteReply::Failed
            },
        }
    }
}

fn batch_size(request: &Request) -> Option<usize> {
    match request {
        Request::GetMany { identifiers } => Some(identifiers.len()),
        Request::PutMany { entries } => Some(entries.len()),
        Request::DeleteMany { tokens } => Some(tokens.len()),
        Request::Get { .. } | Request::Put { .. } | Request::Delete { .. } => None,
    }
}
