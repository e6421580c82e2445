//! Remote endpoint abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use spendsync_core::{Category, ConfirmedExpense, TempId, WriteIntent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

/// The remote create-record operation the drain submits intents to.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.).
#[async_trait]
pub trait WriteEndpoint: Send + Sync {
    /// Submits one intent with the given bearer token.
    ///
    /// On success returns the server's version of the record, carrying its
    /// permanent id and server-computed fields.
    async fn create_expense(&self, intent: &WriteIntent, token: &str)
        -> SyncResult<ConfirmedExpense>;
}

/// The remote list operations used by the initial fetch.
#[async_trait]
pub trait ReadEndpoint: Send + Sync {
    /// Lists the categories available to the user.
    async fn list_categories(&self, token: &str) -> SyncResult<Vec<Category>>;

    /// Lists the user's confirmed records.
    async fn list_expenses(&self, token: &str) -> SyncResult<Vec<ConfirmedExpense>>;
}

#[async_trait]
impl<T: WriteEndpoint + ?Sized> WriteEndpoint for Arc<T> {
    async fn create_expense(
        &self,
        intent: &WriteIntent,
        token: &str,
    ) -> SyncResult<ConfirmedExpense> {
        (**self).create_expense(intent, token).await
    }
}

#[async_trait]
impl<T: ReadEndpoint + ?Sized> ReadEndpoint for Arc<T> {
    async fn list_categories(&self, token: &str) -> SyncResult<Vec<Category>> {
        (**self).list_categories(token).await
    }

    async fn list_expenses(&self, token: &str) -> SyncResult<Vec<ConfirmedExpense>> {
        (**self).list_expenses(token).await
    }
}

/// One call observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Intent that was submitted.
    pub temp_id: TempId,
    /// Token presented with it.
    pub token: String,
    /// Whether it would have gone out as multipart.
    pub multipart: bool,
}

/// A scriptable in-memory server for testing.
///
/// Submissions consume scripted outcomes in order; once the script is empty
/// every submission is accepted and echoed back with the next server id.
/// Accepted records are added to the list the read side returns.
#[derive(Debug)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<SyncResult<ConfirmedExpense>>>,
    next_remote_id: AtomicU64,
    submissions: Mutex<Vec<Submission>>,
    categories: Mutex<Vec<Category>>,
    expenses: Mutex<Vec<ConfirmedExpense>>,
    unreachable: AtomicBool,
    fail_reads: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    submitted: Notify,
}

impl MockTransport {
    /// Creates a new mock transport whose server ids start at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a mock whose automatically assigned server ids start at `id`.
    pub fn starting_at(id: u64) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            next_remote_id: AtomicU64::new(id),
            submissions: Mutex::new(Vec::new()),
            categories: Mutex::new(Vec::new()),
            expenses: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            gate: Mutex::new(None),
            submitted: Notify::new(),
        }
    }

    /// Scripts the outcome of the next unscripted submission.
    pub fn push_outcome(&self, outcome: SyncResult<ConfirmedExpense>) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Scripts a failure for the next unscripted submission.
    pub fn push_failure(&self, error: SyncError) {
        self.push_outcome(Err(error));
    }

    /// Makes every call fail with a retryable transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Makes the list operations fail with a server error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Sets the categories the server lists.
    pub fn set_categories(&self, categories: Vec<Category>) {
        *self.categories.lock() = categories;
    }

    /// Sets the records the server lists.
    pub fn set_expenses(&self, expenses: Vec<ConfirmedExpense>) {
        *self.expenses.lock() = expenses;
    }

    /// Records the server currently holds.
    pub fn expenses(&self) -> Vec<ConfirmedExpense> {
        self.expenses.lock().clone()
    }

    /// Every submission seen so far, in arrival order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    /// How many times `temp_id` was submitted.
    pub fn submission_count(&self, temp_id: TempId) -> usize {
        self.submissions
            .lock()
            .iter()
            .filter(|s| s.temp_id == temp_id)
            .count()
    }

    /// Parks every subsequent submission until [`Self::release`] or
    /// [`Self::release_one`] lets it through.
    pub fn hold(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets one parked submission through.
    pub fn release_one(&self) {
        if let Some(gate) = self.gate.lock().as_ref() {
            gate.add_permits(1);
        }
    }

    /// Lets every parked and future submission through.
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.close();
        }
    }

    /// Waits until a submission has arrived (parked or not).
    pub async fn wait_for_submission(&self) {
        self.submitted.notified().await;
    }

    fn accept(&self, intent: &WriteIntent) -> ConfirmedExpense {
        let payload = &intent.payload;
        let category = payload.category.and_then(|id| {
            self.categories
                .lock()
                .iter()
                .find(|c| c.id == id)
                .cloned()
        });
        ConfirmedExpense {
            id: self.next_remote_id.fetch_add(1, Ordering::SeqCst),
            transaction_type: payload.transaction_type,
            amount: payload.amount,
            description: payload.description.clone(),
            date: payload.date.unwrap_or_default(),
            category: payload.category,
            category_name: category.as_ref().map(|c| c.name.clone()),
            category_icon: category.map(|c| c.icon),
            receipt: payload
                .receipt
                .as_ref()
                .map(|r| format!("/media/receipts/{}", r.file_name)),
        }
    }

    fn check_reachable(&self) -> SyncResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("network unreachable"));
        }
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WriteEndpoint for MockTransport {
    async fn create_expense(
        &self,
        intent: &WriteIntent,
        token: &str,
    ) -> SyncResult<ConfirmedExpense> {
        self.submissions.lock().push(Submission {
            temp_id: intent.temp_id,
            token: token.to_string(),
            multipart: intent.has_attachment,
        });
        self.submitted.notify_one();

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            // A closed gate means released.
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.check_reachable()?;
        let scripted = self.outcomes.lock().pop_front();
        let outcome = scripted.unwrap_or_else(|| Ok(self.accept(intent)));
        if let Ok(confirmed) = &outcome {
            self.expenses.lock().push(confirmed.clone());
        }
        outcome
    }
}

#[async_trait]
impl ReadEndpoint for MockTransport {
    async fn list_categories(&self, _token: &str) -> SyncResult<Vec<Category>> {
        self.check_reachable()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::from_status(500, b"categories unavailable"));
        }
        Ok(self.categories.lock().clone())
    }

    async fn list_expenses(&self, _token: &str) -> SyncResult<Vec<ConfirmedExpense>> {
        self.check_reachable()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::from_status(500, b"expenses unavailable"));
        }
        Ok(self.expenses.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendsync_core::{Amount, ExpensePayload};

    fn intent(id: u64, cents: i64) -> WriteIntent {
        let payload = ExpensePayload::new(Amount::from_cents(cents))
            .with_date("2024-01-01".parse().unwrap())
            .with_category(3);
        WriteIntent {
            temp_id: TempId::new(id),
            payload,
            has_attachment: false,
        }
    }

    #[tokio::test]
    async fn unscripted_submissions_are_accepted() {
        let transport = MockTransport::starting_at(99);
        transport.set_categories(vec![Category {
            id: 3,
            name: "Food".into(),
            icon: "mdi-food".into(),
            kind: Default::default(),
            parent: None,
        }]);

        let confirmed = transport.create_expense(&intent(1, 4250), "t").await.unwrap();

        assert_eq!(confirmed.id, 99);
        assert_eq!(confirmed.amount, Amount::from_cents(4250));
        assert_eq!(confirmed.category_name.as_deref(), Some("Food"));
        assert_eq!(transport.list_expenses("t").await.unwrap(), vec![confirmed]);
    }

    #[tokio::test]
    async fn scripted_outcomes_are_consumed_in_order() {
        let transport = MockTransport::new();
        transport.push_failure(SyncError::Timeout);

        assert!(matches!(
            transport.create_expense(&intent(1, 1), "t").await,
            Err(SyncError::Timeout)
        ));
        assert!(transport.create_expense(&intent(1, 1), "t").await.is_ok());
        assert_eq!(transport.submission_count(TempId::new(1)), 2);
    }

    #[tokio::test]
    async fn unreachable_fails_every_call() {
        let transport = MockTransport::new();
        transport.set_unreachable(true);

        let err = transport.create_expense(&intent(1, 1), "t").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(transport.list_categories("t").await.is_err());
        assert!(transport.expenses().is_empty());
    }

    #[tokio::test]
    async fn submissions_record_the_token() {
        let transport = MockTransport::new();
        transport.create_expense(&intent(7, 1), "secret").await.unwrap();

        let seen = transport.submissions();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].temp_id, TempId::new(7));
        assert_eq!(seen[0].token, "secret");
        assert!(!seen[0].multipart);
    }
}
