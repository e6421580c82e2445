//! Storage backend trait definition.

use crate::error::StorageResult;
use crate::key::StorageKey;

/// A keyed, durable byte store.
///
/// Storage backends are **opaque byte stores**. Each key holds exactly one
/// value which is replaced as a whole; callers persist full snapshots rather
/// than deltas. Backends do not understand records or queue entries.
///
/// # Invariants
///
/// - `read` returns exactly the bytes of the last successful `write`
/// - A failed `write` leaves the previous value readable
/// - `remove` of a missing key succeeds
/// - Backends must be `Send + Sync`; all methods take `&self` so a single
///   handle can be shared behind an `Arc`
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads the value stored under `key`, or `None` if nothing was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be read.
    fn read(&self, key: &StorageKey) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically replaces the value stored under `key`.
    ///
    /// After this returns successfully the value survives process
    /// termination (for durable backends).
    ///
    /// # Errors
    ///
    /// Returns an error if the value could not be made durable. The
    /// previous value is still in place in that case.
    fn write(&self, key: &StorageKey, data: &[u8]) -> StorageResult<()>;

    /// Removes the value stored under `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn remove(&self, key: &StorageKey) -> StorageResult<()>;

    /// Lists the keys that currently hold a value, in sorted order.
    ///
    /// # Errors
    ///
    /// Returns an error if the key space cannot be enumerated.
    fn keys(&self) -> StorageResult<Vec<StorageKey>>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// `write` is already durable on its own; this additionally flushes
    /// directory metadata where the platform supports it.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&self) -> StorageResult<()>;
}
