//! # spendsync sync
//!
//! Sync engine for the spendsync offline-first write buffer.
//!
//! This crate provides:
//! - The drain state machine ([`SyncEngine`]): queued write intents are
//!   submitted one at a time, in submission order, halting at the first
//!   failure
//! - Coalescing of concurrent triggers into at most one active drain
//! - Failure classification (transient, authentication, permanent) with an
//!   optional dead-letter policy for permanent rejections
//! - The best-effort initial fetch of categories and records
//! - Remote endpoint abstractions, an HTTP binding over an injectable
//!   [`HttpClient`], and a scriptable [`MockTransport`]
//!
//! ## Architecture
//!
//! ```text
//! user action ──► ClientState::record_expense ──► SyncEngine::trigger
//!                                                    │ (spawned task)
//!                 ┌──────────────────────────────────┘
//!                 ▼
//!        snapshot queue ─► submit intent ─► confirm / halt ─► next intent
//! ```
//!
//! ## Key Invariants
//!
//! - Intents are submitted in strict FIFO order within a pass
//! - A failed intent is neither removed nor reconciled
//! - At most one drain is active; triggers during a drain request one
//!   more pass instead of starting a second drain
//! - The credential is read for every submission, never cached
//! - Errors never propagate to the code that triggered a drain

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collab;
mod config;
mod engine;
mod error;
mod http;
mod transport;

pub use collab::{AuthProvider, ConnectivityOracle, ManualConnectivity, SharedToken, StaticToken};
pub use config::{RejectionPolicy, SyncConfig};
pub use engine::{
    DrainHandle, DrainOutcome, DrainReport, InitialSync, PassHalt, PassReport, SkipReason,
    SyncEngine, SyncState, SyncStats, TriggerOutcome,
};
pub use error::{FailureKind, SyncError, SyncResult};
pub use http::{
    ClientFailure, FilePart, HttpClient, HttpRequest, HttpResponse, HttpTransport, Method,
    MultipartForm, RequestBody,
};
pub use transport::{MockTransport, ReadEndpoint, Submission, WriteEndpoint};
