#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use quietbox_proto::Identifier;

use super::{MailboxStorage, StorageError};

/// In-memory mailbox storage.
///
/// All state is wrapped in `Arc<Mutex<>>` so clones share one map. Uses
/// `lock().expect()`, which panics if the mutex is poisoned. All operations
/// are O(1).
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

struct MemoryStorageInner {
    values: HashMap<Identifier, Vec<u8>>,
    /// Maximum number of values; `None` is unbounded
    limit: Option<usize>,
}

impl MemoryStorage {
    /// Create a new empty, unbounded `MemoryStorage`
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Storage that refuses inserts beyond `limit` values.
    pub fn with_limit(limit: usize) -> Self {
        Self::build(Some(limit))
    }

    fn build(limit: Option<usize>) -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryStorageInner { values: HashMap::new(), limit })) }
    }

    /// Whether `identifier` holds a value.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.inner.lock().expect("Mutex poisoned").values.contains_key(identifier)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxStorage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn get(&self, identifier: &Identifier) -> Result<Option<Vec<u8>>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.values.get(identifier).cloned())
    }

    #[allow(clippy::expect_used)]
    fn insert_if_absent(&self, identifier: &Identifier, value: &[u8]) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if inner.values.contains_key(identifier) {
            return Ok(false);
        }
        if let Some(limit) = inner.limit
            && inner.values.len() >= limit
        {
            return Err(StorageError::CapacityExceeded { limit });
        }

        inner.values.insert(*identifier, value.to_vec());
        debug_assert!(inner.limit.is_none_or(|limit| inner.values.len() <= limit));
        Ok(true)
    }

    #[allow(clippy::expect_used)]
    fn remove(&self, identifier: &Identifier) -> Result<bool, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").values.remove(identifier).is_some())
    }

    #[allow(clippy::expect_used)]
    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> Identifier {
        Identifier::from_bytes([byte; 32])
    }

    #[test]
    fn values_are_write_once() {
        let storage = MemoryStorage::new();
        assert!(storage.insert_if_absent(&id(1), b"first").unwrap());
        assert!(!storage.insert_if_absent(&id(1), b"second").unwrap());
        assert_eq!(storage.get(&id(1)).unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn remove_reports_presence() {
        let storage = MemoryStorage::new();
        storage.insert_if_absent(&id(2), b"v").unwrap();
        assert!(storage.remove(&id(2)).unwrap());
        assert!(!storage.remove(&id(2)).unwrap());
        assert!(storage.is_empty().unwrap());
    }

    #[test]
    fn clones_share_state() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();
        clone.insert_if_absent(&id(3), b"v").unwrap();
        assert!(storage.contains(&id(3)));
    }

    #[test]
    fn limit_refuses_new_values_only() {
        let storage = MemoryStorage::with_limit(1);
        storage.insert_if_absent(&id(1), b"a").unwrap();

        assert_eq!(
            storage.insert_if_absent(&id(2), b"b"),
            Err(StorageError::CapacityExceeded { limit: 1 })
        );
        assert!(!storage.insert_if_absent(&id(1), b"c").unwrap());
    }
}
