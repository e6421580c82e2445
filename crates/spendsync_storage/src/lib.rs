//! # spendsync storage
//!
//! Durable key/value storage backends for the spendsync write buffer.
//!
//! Backends are **opaque byte stores**: each value is addressed by a
//! versioned [`StorageKey`] and replaced as a whole on every write. The
//! layers above (record store, pending write queue) own all encoding.
//!
//! ## Design Principles
//!
//! - A write either fully replaces the previous value or leaves it untouched
//! - No knowledge of records, intents, or their wire formats
//! - Must be `Send + Sync` so one handle can be shared by every component
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral sessions
//! - [`FileBackend`] - One file per key inside a locked data directory
//!
//! ## Example
//!
//! ```rust
//! use spendsync_storage::{InMemoryBackend, StorageBackend, StorageKey};
//!
//! let backend = InMemoryBackend::new();
//! let key = StorageKey::new("expenses.queue", 1).unwrap();
//! backend.write(&key, b"hello world").unwrap();
//! assert_eq!(backend.read(&key).unwrap().as_deref(), Some(&b"hello world"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod key;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use key::StorageKey;
pub use memory::InMemoryBackend;
