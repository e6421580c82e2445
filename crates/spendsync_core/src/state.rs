//! The client's explicitly constructed write-buffer state.

use crate::error::CoreResult;
use crate::id::{RecordId, TempId};
use crate::model::{Category, ConfirmedExpense, Expense, ExpensePayload};
use crate::queue::{DeadLetter, PendingWriteQueue, WriteIntent};
use crate::store::LocalRecordStore;
use chrono::NaiveDate;
use parking_lot::RwLock;
use spendsync_storage::StorageBackend;
use std::sync::Arc;

/// Owns the local record store and the pending write queue.
///
/// `ClientState` replaces process-wide singletons: it is built once by
/// [`ClientState::hydrate`] and handed to the sync engine and to whatever
/// renders the records. Methods take `&self`; each one holds the locks only
/// for the duration of a single in-memory mutation plus its persist, never
/// across an `.await`, and readers receive owned snapshots.
///
/// Lock order is always store, then queue.
pub struct ClientState {
    backend: Arc<dyn StorageBackend>,
    store: RwLock<LocalRecordStore>,
    queue: RwLock<PendingWriteQueue>,
}

impl ClientState {
    /// Loads the persisted store and queue from `backend`.
    ///
    /// Hydration repairs what a crash can leave behind:
    ///
    /// - A journaled acknowledgment whose confirmed record never reached
    ///   disk is reconciled now, so the write is not sent again.
    /// - A pending record whose intent was never written is queued again
    ///   from its own fields (without receipt bytes, which only the lost
    ///   intent carried).
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state cannot be read or decoded, or if
    /// a repaired intent cannot be persisted.
    pub fn hydrate(backend: Arc<dyn StorageBackend>) -> CoreResult<Self> {
        let store = LocalRecordStore::open(Arc::clone(&backend))?;
        Self::hydrate_store(backend, store)
    }

    /// Like [`Self::hydrate`], with `today` dating payloads that carry no
    /// date.
    ///
    /// # Errors
    ///
    /// See [`Self::hydrate`].
    pub fn hydrate_with_clock(
        backend: Arc<dyn StorageBackend>,
        today: fn() -> NaiveDate,
    ) -> CoreResult<Self> {
        let store = LocalRecordStore::open(Arc::clone(&backend))?.with_clock(today);
        Self::hydrate_store(backend, store)
    }

    fn hydrate_store(backend: Arc<dyn StorageBackend>, mut store: LocalRecordStore) -> CoreResult<Self> {
        let mut queue = PendingWriteQueue::open(Arc::clone(&backend))?;

        if let Some(max) = queue.max_temp_id() {
            store.reserve_past(max);
        }

        for ack in queue.acknowledgments().to_vec() {
            let temp_id = ack.temp_id;
            match store.reconcile(temp_id, ack.confirmed) {
                Ok(_) => {
                    tracing::info!(temp_id = %temp_id, "replayed acknowledged write");
                    if let Err(e) = queue.settle(temp_id) {
                        tracing::warn!(temp_id = %temp_id, error = %e, "could not settle acknowledgment");
                    }
                }
                // Reconciled in memory; the journal entry stays for the next start.
                Err(e) => {
                    tracing::warn!(temp_id = %temp_id, error = %e, "could not persist replayed acknowledgment");
                }
            }
        }

        let orphans: Vec<Expense> = store
            .records()
            .iter()
            .filter(|r| match r.id.temp_id() {
                Some(id) => !queue.contains(id) && queue.dead_letter(id).is_none(),
                None => false,
            })
            .cloned()
            .collect();

        // Oldest first, so the repaired intents keep their submission order.
        for record in orphans.iter().rev() {
            if let Some(temp_id) = record.id.temp_id() {
                tracing::warn!(temp_id = %temp_id, "pending record had no write intent, requeueing");
                queue.enqueue(temp_id, record.to_payload(), false)?;
            }
        }

        tracing::info!(
            records = store.len(),
            pending = store.pending_count(),
            queued = queue.len(),
            rejected = queue.dead_letters().len(),
            "client state hydrated"
        );

        Ok(Self {
            backend,
            store: RwLock::new(store),
            queue: RwLock::new(queue),
        })
    }

    /// Records an expense optimistically and queues its write intent.
    ///
    /// The returned record is pending and already at the head of
    /// [`Self::expenses`]. A payload without a date is queued with the date
    /// the record was given.
    ///
    /// # Errors
    ///
    /// Returns an error if either the record or the intent cannot be
    /// persisted. Nothing is left behind in that case.
    pub fn record_expense(&self, mut payload: ExpensePayload) -> CoreResult<Expense> {
        let mut store = self.store.write();
        let mut queue = self.queue.write();

        let temp_id = store.next_temp_id();
        let record = store.insert_optimistic(&payload)?;
        debug_assert_eq!(record.id, RecordId::Temporary(temp_id));

        // The server receives the same date the optimistic record shows.
        payload.date = Some(record.date);

        let has_attachment = payload.has_attachment();
        if let Err(e) = queue.enqueue(temp_id, payload, has_attachment) {
            if let Err(undo) = store.discard_optimistic(temp_id) {
                tracing::error!(temp_id = %temp_id, error = %undo, "failed to undo optimistic insert");
            }
            return Err(e);
        }

        Ok(record)
    }

    /// Returns a copy of the pending write queue in submission order.
    #[must_use]
    pub fn pending_snapshot(&self) -> Vec<WriteIntent> {
        self.queue.read().peek_from_head()
    }

    /// Applies a server acknowledgment: journals it in place of the intent,
    /// replaces the optimistic record with `confirmed`, then settles the
    /// journal entry.
    ///
    /// All of it happens under one critical section, so no reader observes
    /// the intent gone while the record is still temporary, or both versions
    /// of the record. If the record write fails, the journal entry stays and
    /// the next [`Self::hydrate`] reconciles from it instead of resubmitting.
    /// Returns whether a record was reconciled.
    ///
    /// # Errors
    ///
    /// Returns the first persistence error. The in-memory state is updated
    /// in full even then.
    pub fn confirm(&self, temp_id: TempId, confirmed: ConfirmedExpense) -> CoreResult<bool> {
        let mut store = self.store.write();
        let mut queue = self.queue.write();

        let journaled = queue.acknowledge(temp_id, confirmed.clone());
        let reconciled = store.reconcile(temp_id, confirmed);

        match (journaled, reconciled) {
            (Ok(_), Ok(reconciled)) => {
                queue.settle(temp_id)?;
                Ok(reconciled)
            }
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Parks a permanently rejected intent in the dead-letter list.
    ///
    /// The optimistic record stays pending. Returns `false` if the intent is
    /// no longer queued.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn reject(
        &self,
        temp_id: TempId,
        reason: impl Into<String>,
        status: Option<u16>,
    ) -> CoreResult<bool> {
        self.queue.write().reject(temp_id, reason, status)
    }

    /// Moves a rejected intent back to the tail of the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if `temp_id` was not rejected or persisting fails.
    pub fn requeue_rejected(&self, temp_id: TempId) -> CoreResult<()> {
        self.queue.write().requeue(temp_id)
    }

    /// Drops a rejected intent together with its optimistic record.
    ///
    /// # Errors
    ///
    /// Returns an error if `temp_id` was not rejected or persisting fails.
    pub fn discard_rejected(&self, temp_id: TempId) -> CoreResult<DeadLetter> {
        let mut store = self.store.write();
        let mut queue = self.queue.write();

        let letter = queue.discard(temp_id)?;
        store.discard_optimistic(temp_id)?;
        Ok(letter)
    }

    /// Replaces confirmed records with the server's list, keeping pending
    /// records ahead of them.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn merge_remote(&self, server_records: Vec<ConfirmedExpense>) -> CoreResult<()> {
        self.store.write().merge_remote(server_records)
    }

    /// Replaces the cached categories.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn replace_categories(&self, categories: Vec<Category>) -> CoreResult<()> {
        self.store.write().replace_categories(categories)
    }

    /// Returns a snapshot of all records, most recent first.
    #[must_use]
    pub fn expenses(&self) -> Vec<Expense> {
        self.store.read().records().to_vec()
    }

    /// Returns a single record.
    #[must_use]
    pub fn expense(&self, id: &RecordId) -> Option<Expense> {
        self.store.read().get(id).cloned()
    }

    /// Returns the cached categories.
    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        self.store.read().categories().to_vec()
    }

    /// Returns the rejected intents.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.queue.read().dead_letters().to_vec()
    }

    /// Returns the number of queued intents.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.read().len()
    }

    /// Returns the number of pending records.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.store.read().pending_count()
    }

    /// Returns the storage backend the state persists to.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }
}

impl std::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState")
            .field("store", &*self.store.read())
            .field("queue", &*self.queue.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::model::{Attachment, TransactionType};
    use crate::persist::{self, QUEUE_KEY, RECORDS_KEY};
    use spendsync_storage::{InMemoryBackend, StorageError, StorageKey, StorageResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Refuses writes to the record list while `refuse_records` is set.
    struct RecordsWriteFault {
        inner: InMemoryBackend,
        refuse_records: AtomicBool,
    }

    impl RecordsWriteFault {
        fn new() -> Self {
            Self {
                inner: InMemoryBackend::new(),
                refuse_records: AtomicBool::new(false),
            }
        }

        fn refuse(&self, refuse: bool) {
            self.refuse_records.store(refuse, Ordering::SeqCst);
        }
    }

    impl StorageBackend for RecordsWriteFault {
        fn read(&self, key: &StorageKey) -> StorageResult<Option<Vec<u8>>> {
            self.inner.read(key)
        }

        fn write(&self, key: &StorageKey, data: &[u8]) -> StorageResult<()> {
            if self.refuse_records.load(Ordering::SeqCst) && key.name() == RECORDS_KEY {
                return Err(StorageError::WriteRefused(key.rendered()));
            }
            self.inner.write(key, data)
        }

        fn remove(&self, key: &StorageKey) -> StorageResult<()> {
            self.inner.remove(key)
        }

        fn keys(&self) -> StorageResult<Vec<StorageKey>> {
            self.inner.keys()
        }

        fn sync(&self) -> StorageResult<()> {
            self.inner.sync()
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn payload(cents: i64) -> ExpensePayload {
        ExpensePayload::new(Amount::from_cents(cents)).with_date(date("2024-01-01"))
    }

    fn confirmed(id: u64, cents: i64) -> ConfirmedExpense {
        ConfirmedExpense {
            id,
            transaction_type: TransactionType::Expense,
            amount: Amount::from_cents(cents),
            description: None,
            date: date("2024-01-01"),
            category: Some(3),
            category_name: Some("Food".into()),
            category_icon: None,
            receipt: None,
        }
    }

    fn hydrate(backend: &Arc<InMemoryBackend>) -> ClientState {
        ClientState::hydrate(backend.clone()).unwrap()
    }

    #[test]
    fn record_expense_queues_intent() {
        let backend = Arc::new(InMemoryBackend::new());
        let state = hydrate(&backend);

        let record = state.record_expense(payload(4250)).unwrap();
        let intents = state.pending_snapshot();

        assert_eq!(intents.len(), 1);
        assert_eq!(Some(intents[0].temp_id), record.id.temp_id());
        assert!(!intents[0].has_attachment);
        assert_eq!(state.expenses()[0], record);
    }

    #[test]
    fn undated_payload_is_queued_with_record_date() {
        let backend = Arc::new(InMemoryBackend::new());
        let state = hydrate(&backend);

        let record = state
            .record_expense(ExpensePayload::new(Amount::from_cents(100)))
            .unwrap();
        let intents = state.pending_snapshot();

        assert_eq!(intents[0].payload.date, Some(record.date));
    }

    #[test]
    fn attachment_flag_follows_payload() {
        let backend = Arc::new(InMemoryBackend::new());
        let state = hydrate(&backend);

        let with_receipt = payload(100).with_receipt(Attachment {
            file_name: "r.jpg".into(),
            content_type: "image/jpeg".into(),
            bytes: vec![1],
        });
        state.record_expense(with_receipt).unwrap();
        assert!(state.pending_snapshot()[0].has_attachment);
        assert_eq!(state.expenses()[0].receipt.as_deref(), Some("r.jpg"));
    }

    #[test]
    fn confirm_removes_intent_and_reconciles() {
        let backend = Arc::new(InMemoryBackend::new());
        let state = hydrate(&backend);

        let record = state.record_expense(payload(4250)).unwrap();
        let temp_id = record.id.temp_id().unwrap();

        assert!(state.confirm(temp_id, confirmed(99, 4250)).unwrap());
        assert_eq!(state.queue_len(), 0);
        assert_eq!(state.pending_count(), 0);
        assert_eq!(state.expenses()[0].id, RecordId::Permanent(99));
        assert!(state.expense(&record.id).is_none());
    }

    #[test]
    fn unpersisted_confirmation_is_not_resubmitted_after_restart() {
        let backend = Arc::new(RecordsWriteFault::new());
        let state = ClientState::hydrate(backend.clone()).unwrap();
        let record = state.record_expense(payload(4250)).unwrap();
        let temp_id = record.id.temp_id().unwrap();

        backend.refuse(true);
        assert!(state.confirm(temp_id, confirmed(99, 4250)).is_err());
        assert_eq!(state.queue_len(), 0);
        drop(state);

        // Record writes are still refused: the replay holds in memory only.
        let state = ClientState::hydrate(backend.clone()).unwrap();
        assert_eq!(state.queue_len(), 0);
        assert!(state.pending_snapshot().is_empty());
        assert_eq!(state.expenses()[0].id, RecordId::Permanent(99));
        drop(state);

        backend.refuse(false);
        let state = ClientState::hydrate(backend.clone()).unwrap();
        assert_eq!(state.queue_len(), 0);
        assert_eq!(state.pending_count(), 0);
        assert_eq!(state.expenses().len(), 1);
        drop(state);

        // The replay was persisted and the journal settled.
        let state = ClientState::hydrate(backend).unwrap();
        assert_eq!(state.expenses()[0].id, RecordId::Permanent(99));
        assert_eq!(state.queue_len(), 0);
    }

    #[test]
    fn confirm_settles_the_journal() {
        let backend = Arc::new(InMemoryBackend::new());
        let state = hydrate(&backend);
        let temp_id = state.record_expense(payload(100)).unwrap().id.temp_id().unwrap();

        state.confirm(temp_id, confirmed(7, 100)).unwrap();
        let queue = PendingWriteQueue::open(backend.clone()).unwrap();
        assert!(queue.acknowledgments().is_empty());
    }

    #[test]
    fn injected_clock_dates_undated_payloads() {
        fn fixed_day() -> NaiveDate {
            NaiveDate::from_ymd_opt(2023, 7, 14).unwrap()
        }

        let backend = Arc::new(InMemoryBackend::new());
        let state = ClientState::hydrate_with_clock(backend, fixed_day).unwrap();
        let record = state
            .record_expense(ExpensePayload::new(Amount::from_cents(100)))
            .unwrap();

        assert_eq!(record.date, date("2023-07-14"));
        assert_eq!(state.pending_snapshot()[0].payload.date, Some(date("2023-07-14")));
    }

    #[test]
    fn failed_enqueue_leaves_nothing_behind() {
        let backend = Arc::new(InMemoryBackend::new());
        let state = hydrate(&backend);

        backend.fail_writes(true);
        assert!(state.record_expense(payload(100)).is_err());
        backend.fail_writes(false);

        assert!(state.expenses().is_empty());
        assert_eq!(state.queue_len(), 0);
    }

    #[test]
    fn hydrate_requeues_orphaned_pending_records() {
        let backend = Arc::new(InMemoryBackend::new());
        {
            let state = hydrate(&backend);
            state.record_expense(payload(100)).unwrap();
            state.record_expense(payload(200)).unwrap();
        }
        // Simulate a crash that lost the queue write.
        persist::save(backend.as_ref(), QUEUE_KEY, &Vec::<WriteIntent>::new()).unwrap();

        let state = hydrate(&backend);
        let intents = state.pending_snapshot();
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].payload.amount, Amount::from_cents(100));
        assert_eq!(intents[1].payload.amount, Amount::from_cents(200));
        assert_eq!(state.queue_len(), state.pending_count());
    }

    #[test]
    fn hydrate_keeps_temp_ids_unique() {
        let backend = Arc::new(InMemoryBackend::new());
        let first = {
            let state = hydrate(&backend);
            state.record_expense(payload(100)).unwrap()
        };

        let state = hydrate(&backend);
        let second = state.record_expense(payload(200)).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(state.queue_len(), 2);
    }

    #[test]
    fn reject_then_discard_removes_record() {
        let backend = Arc::new(InMemoryBackend::new());
        let state = hydrate(&backend);

        let record = state.record_expense(payload(100)).unwrap();
        let temp_id = record.id.temp_id().unwrap();

        assert!(state.reject(temp_id, "invalid", Some(400)).unwrap());
        assert_eq!(state.queue_len(), 0);
        assert!(state.expense(&record.id).unwrap().is_pending());
        assert_eq!(state.dead_letters().len(), 1);

        state.discard_rejected(temp_id).unwrap();
        assert!(state.expenses().is_empty());
        assert!(state.dead_letters().is_empty());
    }

    #[test]
    fn requeue_rejected_goes_to_tail() {
        let backend = Arc::new(InMemoryBackend::new());
        let state = hydrate(&backend);

        let a = state.record_expense(payload(1)).unwrap().id.temp_id().unwrap();
        let b = state.record_expense(payload(2)).unwrap().id.temp_id().unwrap();

        state.reject(a, "invalid", Some(400)).unwrap();
        state.requeue_rejected(a).unwrap();

        let order: Vec<_> = state.pending_snapshot().iter().map(|i| i.temp_id).collect();
        assert_eq!(order, vec![b, a]);
    }
}
