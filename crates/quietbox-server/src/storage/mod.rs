//! Storage abstraction for the mailbox server.
//!
//! A mailbox is a flat map from 32-byte identifiers to opaque values with
//! write-once semantics: a stored identifier is never overwritten, only
//! removed. The trait is synchronous; the runtime calls it from request
//! handlers that never hold a lock across an await point.

mod chaotic;
mod error;
mod memory;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use quietbox_proto::Identifier;

/// Storage backend for mailbox values.
///
/// Must be Clone (shared by every connection task), Send + Sync, and
/// synchronous. Implementations share state across clones.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned.
pub trait MailboxStorage: Clone + Send + Sync + 'static {
    /// Value stored under `identifier`, if any.
    fn get(&self, identifier: &Identifier) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` unless `identifier` is already occupied.
    ///
    /// # Invariants
    ///
    /// - Post: returns `true` iff the value was stored by this call
    /// - An existing value is never modified
    fn insert_if_absent(&self, identifier: &Identifier, value: &[u8]) -> Result<bool, StorageError>;

    /// Remove the value under `identifier`. Returns whether one existed.
    fn remove(&self, identifier: &Identifier) -> Result<bool, StorageError>;

    /// Number of stored values.
    fn len(&self) -> Result<usize, StorageError>;

    /// Whether nothing is stored.
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}
