//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::key::StorageKey;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An in-memory storage backend.
///
/// This backend stores all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral sessions that don't need persistence
///
/// Writes can be made to fail on demand with [`InMemoryBackend::fail_writes`]
/// to exercise the persistence error paths of the layers above.
///
/// # Example
///
/// ```rust
/// use spendsync_storage::{InMemoryBackend, StorageBackend, StorageKey};
///
/// let backend = InMemoryBackend::new();
/// let key = StorageKey::new("test", 1).unwrap();
/// backend.write(&key, b"test data").unwrap();
/// assert_eq!(backend.keys().unwrap(), vec![key]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<BTreeMap<StorageKey, Vec<u8>>>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = (StorageKey, Vec<u8>)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Returns a copy of all entries in the backend.
    #[must_use]
    pub fn entries(&self) -> Vec<(StorageKey, Vec<u8>)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Makes every subsequent `write` and `remove` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self, key: &StorageKey) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRefused(key.rendered()));
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read(&self, key: &StorageKey) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &StorageKey, data: &[u8]) -> StorageResult<()> {
        self.check_writable(key)?;
        self.entries.write().insert(key.clone(), data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> StorageResult<()> {
        self.check_writable(key)?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<StorageKey>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn sync(&self) -> StorageResult<()> {
        // Nothing to flush
        Ok(())
    }
}
