//! # spendsync core
//!
//! The local half of the offline-first expense write buffer.
//!
//! This crate provides:
//! - The expense domain model ([`Expense`], [`ExpensePayload`], [`Category`])
//! - Temporary vs permanent record identity ([`RecordId`], [`TempId`])
//! - The [`LocalRecordStore`]: ordered, durable, most-recent-first records
//! - The [`PendingWriteQueue`]: durable FIFO of [`WriteIntent`]s
//! - [`ClientState`]: the explicitly constructed state object that owns
//!   both and is hydrated from a [`StorageBackend`]
//!
//! ## Key Invariants
//!
//! - A record is pending iff its identity is temporary
//! - Every temporary record has at most one write intent
//! - Intents keep submission order; nothing is reordered on disk
//! - Reconciliation replaces a record in place, never duplicates it
//! - Every queue and store mutation is persisted before it is reported
//!
//! [`StorageBackend`]: spendsync_storage::StorageBackend

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod amount;
mod error;
mod id;
mod model;
mod persist;
mod queue;
mod state;
mod store;

pub use amount::Amount;
pub use error::{CoreError, CoreResult};
pub use id::{RecordId, TempId};
pub use model::{
    Attachment, Category, ConfirmedExpense, Expense, ExpensePayload, TransactionType,
    DEFAULT_CATEGORY_ICON,
};
pub use persist::{ACKNOWLEDGED_KEY, CATEGORIES_KEY, DEAD_LETTERS_KEY, FORMAT_VERSION, QUEUE_KEY, RECORDS_KEY};
pub use queue::{Acknowledgment, DeadLetter, PendingWriteQueue, WriteIntent};
pub use state::ClientState;
pub use store::LocalRecordStore;
