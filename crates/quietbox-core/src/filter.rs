//! Membership filter consulted before fetching.
//!
//! A filter may answer "maybe" for identifiers the server does not hold (that
//! costs one wasted fetch) but a "no" is trusted: the identifier is never
//! requested.

use std::collections::HashSet;

use quietbox_proto::{Identifier, cbor};

use crate::error::CoreError;

/// Approximate set of identifiers present on the server.
pub trait MembershipFilter {
    /// `false` means the identifier is certainly absent.
    fn query(&self, identifier: &Identifier) -> bool;

    /// Record that the identifier now holds a value.
    fn insert(&mut self, identifier: &Identifier);

    /// Record that the identifier was deleted.
    fn remove(&mut self, identifier: &Identifier);
}

/// Filter that knows nothing and always answers "maybe".
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl MembershipFilter for NoFilter {
    fn query(&self, _identifier: &Identifier) -> bool {
        true
    }

    fn insert(&mut self, _identifier: &Identifier) {}

    fn remove(&mut self, _identifier: &Identifier) {}
}

/// Exact filter over a snapshot of the server's identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSetFilter {
    present: HashSet<Identifier>,
}

impl IdentifierSetFilter {
    /// Empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot exchanged during the initial handshake.
    ///
    /// # Errors
    ///
    /// `Format` if the snapshot is not a CBOR list of identifiers.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, CoreError> {
        let identifiers: Vec<Identifier> = cbor::from_slice(bytes)
            .map_err(|e| CoreError::Format { reason: format!("filter snapshot: {e}") })?;
        Ok(Self { present: identifiers.into_iter().collect() })
    }

    /// Encode the filter as a snapshot.
    pub fn snapshot(&self) -> Result<Vec<u8>, CoreError> {
        let mut identifiers: Vec<&Identifier> = self.present.iter().collect();
        identifiers.sort();
        cbor::to_vec(&identifiers).map_err(|e| CoreError::Format { reason: e.to_string() })
    }

    /// Number of identifiers recorded.
    pub fn len(&self) -> usize {
        self.present.len()
    }

    /// Whether no identifiers are recorded.
    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }
}

impl MembershipFilter for IdentifierSetFilter {
    fn query(&self, identifier: &Identifier) -> bool {
        self.present.contains(identifier)
    }

    fn insert(&mut self, identifier: &Identifier) {
        self.present.insert(*identifier);
    }

    fn remove(&mut self, identifier: &Identifier) {
        self.present.remove(identifier);
    }
}
