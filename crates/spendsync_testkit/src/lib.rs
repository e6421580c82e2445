//! # spendsync testkit
//!
//! Test utilities for spendsync.
//!
//! This crate provides:
//! - Client state fixtures over memory or temporary-directory storage,
//!   with simulated restarts
//! - Builders for payloads, categories and server confirmations
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spendsync_testkit::prelude::*;
//!
//! #[test]
//! fn survives_restart() {
//!     let client = TestClient::file();
//!     client.record_expense(expense_payload(4250, "2024-01-01")).unwrap();
//!     let client = client.reopen();
//!     assert_eq!(client.queue_len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
