//! Test fixtures and client state helpers.
//!
//! Provides convenience functions for setting up client state over
//! throwaway storage and for building the values tests pass around.

use chrono::NaiveDate;
use spendsync_core::{
    Amount, Category, ClientState, ConfirmedExpense, ExpensePayload, TransactionType,
};
use spendsync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Client state over test storage, with automatic cleanup.
pub struct TestClient {
    /// The hydrated state.
    pub state: Arc<ClientState>,
    backend: Arc<dyn StorageBackend>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestClient {
    /// Creates client state over an in-memory backend.
    pub fn memory() -> Self {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        Self::hydrate(backend, None)
    }

    /// Creates client state over a file backend in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend: Arc<dyn StorageBackend> =
            Arc::new(FileBackend::open(temp_dir.path()).expect("Failed to open file backend"));
        Self::hydrate(backend, Some(temp_dir))
    }

    fn hydrate(backend: Arc<dyn StorageBackend>, temp_dir: Option<TempDir>) -> Self {
        let state = ClientState::hydrate(Arc::clone(&backend)).expect("Failed to hydrate state");
        Self {
            state: Arc::new(state),
            backend,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the storage directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(|d| d.path())
    }

    /// Returns the backend the state persists to.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Simulates a process restart: drops the state and hydrates a fresh
    /// one from what was persisted.
    ///
    /// For file-based clients every other handle to the state (an engine,
    /// say) must be dropped first, or the directory lock is still held.
    pub fn reopen(self) -> Self {
        let Self {
            state,
            backend,
            _temp_dir,
        } = self;
        drop(state);

        match _temp_dir {
            Some(dir) => {
                drop(backend);
                let backend: Arc<dyn StorageBackend> = Arc::new(
                    FileBackend::open(dir.path()).expect("Failed to reopen file backend"),
                );
                Self::hydrate(backend, Some(dir))
            }
            None => Self::hydrate(backend, None),
        }
    }
}

impl std::ops::Deref for TestClient {
    type Target = ClientState;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

/// Parses a `YYYY-MM-DD` date.
pub fn date(s: &str) -> NaiveDate {
    s.parse().expect("Invalid date literal")
}

/// An expense payload with an amount in cents and a date.
pub fn expense_payload(cents: i64, on: &str) -> ExpensePayload {
    ExpensePayload::new(Amount::from_cents(cents)).with_date(date(on))
}

/// The "Food" category used across scenarios (id 3).
pub fn food_category() -> Category {
    Category {
        id: 3,
        name: "Food".into(),
        icon: "mdi-food".into(),
        kind: TransactionType::Expense,
        parent: None,
    }
}

/// The server's confirmation of `payload` under permanent id `id`.
pub fn confirmed(id: u64, payload: &ExpensePayload) -> ConfirmedExpense {
    ConfirmedExpense {
        id,
        transaction_type: payload.transaction_type,
        amount: payload.amount,
        description: payload.description.clone(),
        date: payload.date.unwrap_or_else(|| date("2024-01-01")),
        category: payload.category,
        category_name: None,
        category_icon: None,
        receipt: None,
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Client state with `count` expenses recorded while offline.
    pub fn offline_queue(count: usize) -> TestClient {
        let client = TestClient::memory();
        for i in 0..count {
            let cents = 100 * (i as i64 + 1);
            client
                .record_expense(expense_payload(cents, "2024-01-01"))
                .expect("Failed to record expense");
        }
        client
    }
}
