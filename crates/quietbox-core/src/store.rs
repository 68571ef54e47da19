//! Typed client for the mailbox store.
//!
//! Wraps a [`Transport`] with request encoding, reply decoding and the
//! membership filter. Batch operations return one result per item inside an
//! outer result that fails only when the whole exchange failed.

use quietbox_proto::{
    DeleteReply, GetReply, Identifier, PutEntry, PutReply, Request, Response, TOMBSTONE,
    TokenPair, messages::DeleteEntry,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    filter::{MembershipFilter, NoFilter},
    transport::Transport,
};

/// Per-operation store failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The transport could not deliver the request
    #[error("no connection: {reason}")]
    NoConnection {
        /// Underlying I/O failure
        reason: String,
    },

    /// The server reply was malformed or reported a failure
    #[error("protocol error: {reason}")]
    ProtocolError {
        /// What went wrong
        reason: String,
    },

    /// The server rejected the key length
    #[error("bad key format")]
    BadKeyFormat,

    /// The identifier already holds a value
    #[error("key taken")]
    KeyTaken,

    /// The revocation token does not belong to the identifier
    #[error("revocation token rejected")]
    AuthFailed,
}

impl StoreError {
    fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolError { reason: reason.into() }
    }
}

/// Successful delete outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The value was removed
    Deleted,
    /// Nothing was stored; deletes are idempotent
    NotFound,
}

/// Result of a single fetch: `None` is "ok-empty".
pub type GetResult = Result<Option<Vec<u8>>, StoreError>;

/// Store client over a transport and a membership filter.
#[derive(Debug)]
pub struct StoreClient<T, F = NoFilter> {
    transport: T,
    filter: F,
}

impl<T: Transport> StoreClient<T, NoFilter> {
    /// Client without a membership filter.
    pub fn new(transport: T) -> Self {
        Self { transport, filter: NoFilter }
    }
}

impl<T: Transport, F: MembershipFilter> StoreClient<T, F> {
    /// Client consulting `filter` before every fetch.
    pub fn with_filter(transport: T, filter: F) -> Self {
        Self { transport, filter }
    }

    /// The membership filter.
    pub fn filter(&self) -> &F {
        &self.filter
    }

    /// The underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Fetch one value.
    pub fn get(&mut self, identifier: &Identifier) -> GetResult {
        if !self.filter.query(identifier) {
            debug!(id = %identifier.short_hex(), "filter negative, skipping fetch");
            return Ok(None);
        }

        match self.exchange(&Request::get(identifier))? {
            Response::Get(reply) => map_get(reply),
            other => Err(unexpected("get", &other)),
        }
    }

    /// Fetch several values, in order.
    ///
    /// Identifiers the filter rules out are answered locally with `Ok(None)`;
    /// if all are ruled out no request is sent.
    pub fn get_many(&mut self, identifiers: &[Identifier]) -> Result<Vec<GetResult>, StoreError> {
        let wanted: Vec<&Identifier> =
            identifiers.iter().filter(|id| self.filter.query(id)).collect();

        let replies = if wanted.is_empty() {
            Vec::new()
        } else {
            match self.exchange(&Request::get_many(wanted.iter().copied()))? {
                Response::GetMany(replies) if replies.len() == wanted.len() => replies,
                Response::GetMany(replies) => {
                    return Err(StoreError::protocol(format!(
                        "get-many returned {} replies for {} identifiers",
                        replies.len(),
                        wanted.len()
                    )));
                },
                other => return Err(unexpected("get-many", &other)),
            }
        };
        let mut fetched = replies.into_iter();

        Ok(identifiers
            .iter()
            .map(|id| {
                if self.filter.query(id) {
                    fetched.next().map_or_else(|| Err(StoreError::protocol("reply missing")), map_get)
                } else {
                    Ok(None)
                }
            })
            .collect())
    }

    /// Store one value.
    pub fn put(&mut self, identifier: &Identifier, value: Vec<u8>) -> Result<(), StoreError> {
        match self.exchange(&Request::put(identifier, value))? {
            Response::Put(reply) => {
                map_put(reply)?;
                self.filter.insert(identifier);
                Ok(())
            },
            other => Err(unexpected("put", &other)),
        }
    }

    /// Store several values.
    pub fn put_many(
        &mut self,
        entries: Vec<(Identifier, Vec<u8>)>,
    ) -> Result<Vec<Result<(), StoreError>>, StoreError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let identifiers: Vec<Identifier> = entries.iter().map(|(id, _)| *id).collect();
        let request = Request::PutMany {
            entries: entries.into_iter().map(|(id, value)| PutEntry::new(&id, value)).collect(),
        };

        let replies = match self.exchange(&request)? {
            Response::PutMany(replies) if replies.len() == identifiers.len() => replies,
            other => return Err(unexpected("put-many", &other)),
        };

        Ok(identifiers
            .iter()
            .zip(replies)
            .map(|(id, reply)| {
                let result = map_put(reply);
                if result.is_ok() {
                    self.filter.insert(id);
                }
                result
            })
            .collect())
    }

    /// Delete one value, authorized by its revocation token.
    pub fn delete(&mut self, pair: &TokenPair) -> Result<DeleteOutcome, StoreError> {
        match self.exchange(&Request::delete(pair))? {
            Response::Delete(reply) => {
                let outcome = map_delete(reply)?;
                self.filter.remove(&pair.identifier);
                Ok(outcome)
            },
            other => Err(unexpected("delete", &other)),
        }
    }

    /// Delete several values.
    pub fn delete_many(
        &mut self,
        pairs: &[TokenPair],
    ) -> Result<Vec<Result<DeleteOutcome, StoreError>>, StoreError> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let request = Request::DeleteMany { tokens: pairs.iter().map(DeleteEntry::from).collect() };
        let replies = match self.exchange(&request)? {
            Response::DeleteMany(replies) if replies.len() == pairs.len() => replies,
            other => return Err(unexpected("delete-many", &other)),
        };

        Ok(pairs
            .iter()
            .zip(replies)
            .map(|(pair, reply)| {
                let outcome = map_delete(reply)?;
                self.filter.remove(&pair.identifier);
                Ok(outcome)
            })
            .collect())
    }

    /// Delete a value and occupy its identifier with a tombstone, so a sender
    /// whose write races the delete cannot resurrect it.
    pub fn revoke(&mut self, pair: &TokenPair) -> Result<(), StoreError> {
        self.delete(pair)?;
        self.put(&pair.identifier, TOMBSTONE.to_vec())
    }

    /// [`StoreClient::revoke`] for several pairs, in two round trips.
    pub fn revoke_many(
        &mut self,
        pairs: &[TokenPair],
    ) -> Result<Vec<Result<(), StoreError>>, StoreError> {
        let deletes = self.delete_many(pairs)?;

        let mut results: Vec<Result<(), StoreError>> =
            deletes.into_iter().map(|r| r.map(|_| ())).collect();
        let tombstones: Vec<(Identifier, Vec<u8>)> = pairs
            .iter()
            .zip(&results)
            .filter(|(_, result)| result.is_ok())
            .map(|(pair, _)| (pair.identifier, TOMBSTONE.to_vec()))
            .collect();

        let mut puts = self.put_many(tombstones)?.into_iter();
        for result in results.iter_mut().filter(|r| r.is_ok()) {
            *result = puts.next().unwrap_or_else(|| Err(StoreError::protocol("reply missing")));
        }

        Ok(results)
    }

    fn exchange(&mut self, request: &Request) -> Result<Response, StoreError> {
        let bytes = request.encode().map_err(|e| StoreError::protocol(e.to_string()))?;

        let reply = self.transport.transceive(&bytes).map_err(|e| {
            warn!(op = request.name(), error = %e, "transport failure");
            StoreError::NoConnection { reason: e.to_string() }
        })?;

        match Response::decode(&reply).map_err(|e| StoreError::protocol(e.to_string()))? {
            Response::Error { message } => Err(StoreError::protocol(message)),
            response => Ok(response),
        }
    }
}

fn map_get(reply: GetReply) -> GetResult {
    match reply {
        GetReply::Value(value) => Ok(Some(value)),
        GetReply::Empty => Ok(None),
        GetReply::BadKeyFormat => Err(StoreError::BadKeyFormat),
        GetReply::Failed => Err(StoreError::protocol("server failed to read")),
    }
}

fn map_put(reply: PutReply) -> Result<(), StoreError> {
    match reply {
        PutReply::Ok => Ok(()),
        PutReply::KeyTaken => Err(StoreError::KeyTaken),
        PutReply::BadKeyFormat => Err(StoreError::BadKeyFormat),
        PutReply::Failed => Err(StoreError::protocol("server failed to write")),
    }
}

fn map_delete(reply: DeleteReply) -> Result<DeleteOutcome, StoreError> {
    match reply {
        DeleteReply::Ok => Ok(DeleteOutcome::Deleted),
        DeleteReply::NotFound => Ok(DeleteOutcome::NotFound),
        DeleteReply::BadKeyFormat => Err(StoreError::BadKeyFormat),
        DeleteReply::AuthFailed => Err(StoreError::AuthFailed),
        DeleteReply::Failed => Err(StoreError::protocol("server failed to delete")),
    }
}

fn unexpected(op: &str, response: &Response) -> StoreError {
    StoreError::protocol(format!("unexpected reply to {op}: {response:?}"))
}
