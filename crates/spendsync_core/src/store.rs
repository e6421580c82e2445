//! Local record store.

use crate::error::CoreResult;
use crate::id::{RecordId, TempId};
use crate::model::{Category, ConfirmedExpense, Expense, ExpensePayload};
use crate::persist::{self, CATEGORIES_KEY, RECORDS_KEY};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use spendsync_storage::StorageBackend;
use std::sync::Arc;

/// Persisted form of the record list.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordsSnapshot {
    next_temp_id: u64,
    records: Vec<Expense>,
}

fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Ordered, durable collection of expense records, most recent first.
///
/// Pending (optimistic) records and confirmed records live in the same
/// sequence. The store also owns the temporary id counter and the cached
/// category list.
///
/// Every mutation writes the full snapshot to the storage backend before
/// returning.
///
/// # Invariants
///
/// - Temporary ids are strictly increasing and never reused, also across
///   restarts (the counter is persisted and re-seeded on open)
/// - `reconcile` never changes the position of a record
/// - `merge_remote` never drops a pending record
pub struct LocalRecordStore {
    backend: Arc<dyn StorageBackend>,
    records: Vec<Expense>,
    categories: Vec<Category>,
    next_temp_id: u64,
    today: fn() -> NaiveDate,
}

impl LocalRecordStore {
    /// Opens the store, loading any persisted records and categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted state cannot be read or decoded.
    pub fn open(backend: Arc<dyn StorageBackend>) -> CoreResult<Self> {
        let snapshot: RecordsSnapshot =
            persist::load(backend.as_ref(), RECORDS_KEY)?.unwrap_or_default();
        let categories: Vec<Category> =
            persist::load(backend.as_ref(), CATEGORIES_KEY)?.unwrap_or_default();

        let highest_seen = snapshot
            .records
            .iter()
            .filter_map(|r| r.id.temp_id())
            .map(TempId::get)
            .max()
            .unwrap_or(0);
        let next_temp_id = snapshot.next_temp_id.max(highest_seen + 1).max(1);

        tracing::debug!(
            records = snapshot.records.len(),
            categories = categories.len(),
            next_temp_id,
            "record store opened"
        );

        Ok(Self {
            backend,
            records: snapshot.records,
            categories,
            next_temp_id,
            today: local_today,
        })
    }

    /// Replaces the clock used to date payloads that carry no date.
    #[must_use]
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Makes sure future temporary ids are greater than `id`.
    pub(crate) fn reserve_past(&mut self, id: TempId) {
        self.next_temp_id = self.next_temp_id.max(id.get() + 1);
    }

    /// Creates a pending record for `payload` and puts it at the head.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be persisted; the record is not
    /// inserted in that case. The temporary id is consumed either way.
    pub fn insert_optimistic(&mut self, payload: &ExpensePayload) -> CoreResult<Expense> {
        let temp_id = TempId::new(self.next_temp_id);
        self.next_temp_id += 1;

        let record = Expense::optimistic(temp_id, payload, (self.today)());
        self.records.insert(0, record.clone());

        if let Err(e) = self.persist_records() {
            self.records.remove(0);
            return Err(e);
        }

        tracing::debug!(temp_id = %temp_id, amount = %record.amount, "optimistic record inserted");
        Ok(record)
    }

    /// Replaces the pending record `temp_id` in place with its confirmed
    /// version.
    ///
    /// Returns `false` (and changes nothing) if no record with that id is
    /// present, e.g. because an unrelated operation removed it.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails. The in-memory replacement is
    /// kept: the confirmed record is the server's truth and is written out
    /// again by the next successful mutation.
    pub fn reconcile(&mut self, temp_id: TempId, confirmed: ConfirmedExpense) -> CoreResult<bool> {
        let target = RecordId::Temporary(temp_id);
        let Some(index) = self.records.iter().position(|r| r.id == target) else {
            tracing::debug!(temp_id = %temp_id, "nothing to reconcile, record is gone");
            return Ok(false);
        };

        let remote_id = confirmed.id;
        self.records[index] = Expense::from(confirmed);
        self.persist_records()?;

        tracing::debug!(temp_id = %temp_id, remote_id, index, "record reconciled");
        Ok(true)
    }

    /// Replaces every confirmed record with `server_records`.
    ///
    /// Pending records are kept untouched, in their current order, ahead of
    /// the merged server records. No content-based deduplication happens:
    /// a pending record only ever disappears through [`Self::reconcile`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be persisted.
    pub fn merge_remote(&mut self, server_records: Vec<ConfirmedExpense>) -> CoreResult<()> {
        let mut merged: Vec<Expense> = self
            .records
            .iter()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        let pending = merged.len();
        merged.extend(server_records.into_iter().map(Expense::from));

        self.records = merged;
        self.persist_records()?;

        tracing::debug!(
            pending,
            confirmed = self.records.len() - pending,
            "remote records merged"
        );
        Ok(())
    }

    /// Removes a pending record. Returns `false` if it is not present.
    ///
    /// Only used to undo an optimistic insert whose write intent could not
    /// be queued, or when the user discards a rejected write.
    pub(crate) fn discard_optimistic(&mut self, temp_id: TempId) -> CoreResult<bool> {
        let target = RecordId::Temporary(temp_id);
        let Some(index) = self.records.iter().position(|r| r.id == target) else {
            return Ok(false);
        };
        self.records.remove(index);
        self.persist_records()?;
        Ok(true)
    }

    /// Replaces the cached category list.
    ///
    /// # Errors
    ///
    /// Returns an error if the categories cannot be persisted.
    pub fn replace_categories(&mut self, categories: Vec<Category>) -> CoreResult<()> {
        self.categories = categories;
        persist::save(self.backend.as_ref(), CATEGORIES_KEY, &self.categories)
    }

    /// Returns the records, most recent first.
    #[must_use]
    pub fn records(&self) -> &[Expense] {
        &self.records
    }

    /// Returns the record with the given id.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&Expense> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// Returns the cached categories.
    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Returns the number of pending records.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_pending()).count()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the id the next optimistic insert will receive.
    #[must_use]
    pub fn next_temp_id(&self) -> TempId {
        TempId::new(self.next_temp_id)
    }

    fn persist_records(&self) -> CoreResult<()> {
        #[derive(Serialize)]
        struct SnapshotRef<'a> {
            next_temp_id: u64,
            records: &'a [Expense],
        }

        persist::save(
            self.backend.as_ref(),
            RECORDS_KEY,
            &SnapshotRef {
                next_temp_id: self.next_temp_id,
                records: &self.records,
            },
        )
    }
}

impl std::fmt::Debug for LocalRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRecordStore")
            .field("records", &self.records.len())
            .field("categories", &self.categories.len())
            .field("next_temp_id", &self.next_temp_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::model::TransactionType;
    use spendsync_storage::InMemoryBackend;

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
            category: None,
            category_name: None,
            category_icon: None,
            receipt: None,
        }
    }

    fn open(backend: &Arc<InMemoryBackend>) -> LocalRecordStore {
        LocalRecordStore::open(backend.clone()).unwrap()
    }

    #[test]
    fn insert_prepends_pending_record() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut store = open(&backend);

        let first = store.insert_optimistic(&payload(100)).unwrap();
        let second = store.insert_optimistic(&payload(200)).unwrap();

        assert!(first.is_pending());
        assert_ne!(first.id, second.id);
        assert_eq!(store.records()[0].id, second.id);
        assert_eq!(store.records()[1].id, first.id);
        assert_eq!(store.pending_count(), 2);
    }

    #[test]
    fn temp_ids_are_monotonic() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut store = open(&backend);

        let ids: Vec<_> = (0..50)
            .map(|i| store.insert_optimistic(&payload(i)).unwrap().id.temp_id().unwrap())
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn reconcile_replaces_in_place() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut store = open(&backend);

        let older = store.insert_optimistic(&payload(100)).unwrap();
        let middle = store.insert_optimistic(&payload(200)).unwrap();
        let newest = store.insert_optimistic(&payload(300)).unwrap();

        let temp = middle.id.temp_id().unwrap();
        assert!(store.reconcile(temp, confirmed(99, 200)).unwrap());

        let ids: Vec<_> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newest.id, RecordId::Permanent(99), older.id]);
        assert!(store.get(&middle.id).is_none());
        assert!(!store.records()[1].is_pending());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn reconcile_missing_is_noop() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut store = open(&backend);
        store.insert_optimistic(&payload(100)).unwrap();
        let writes = backend.write_count();

        assert!(!store.reconcile(TempId::new(999), confirmed(1, 1)).unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(backend.write_count(), writes);
    }

    #[test]
    fn merge_remote_keeps_pending_first() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut store = open(&backend);

        store.merge_remote(vec![confirmed(1, 10)]).unwrap();
        let pending = store.insert_optimistic(&payload(4250)).unwrap();

        store
            .merge_remote(vec![confirmed(2, 20), confirmed(3, 4250)])
            .unwrap();

        let ids: Vec<_> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![pending.id, RecordId::Permanent(2), RecordId::Permanent(3)]
        );
    }

    #[test]
    fn merge_remote_keeps_pending_order() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut store = open(&backend);

        let a = store.insert_optimistic(&payload(1)).unwrap();
        store.merge_remote(vec![confirmed(10, 10)]).unwrap();
        let b = store.insert_optimistic(&payload(2)).unwrap();

        store.merge_remote(vec![]).unwrap();
        let ids: Vec<_> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn state_survives_reopen() {
        let backend = Arc::new(InMemoryBackend::new());
        let pending_id;
        {
            let mut store = open(&backend);
            store.merge_remote(vec![confirmed(7, 700)]).unwrap();
            pending_id = store.insert_optimistic(&payload(100)).unwrap().id;
            store
                .replace_categories(vec![Category {
                    id: 3,
                    name: "Food".into(),
                    icon: "mdi-food".into(),
                    kind: TransactionType::Expense,
                    parent: None,
                }])
                .unwrap();
        }

        let mut store = open(&backend);
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].id, pending_id);
        assert_eq!(store.categories()[0].name, "Food");

        let next = store.insert_optimistic(&payload(1)).unwrap();
        assert!(next.id.temp_id().unwrap() > pending_id.temp_id().unwrap());
    }

    #[test]
    fn failed_persist_rolls_back_insert() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut store = open(&backend);

        backend.fail_writes(true);
        assert!(store.insert_optimistic(&payload(100)).is_err());
        assert!(store.is_empty());

        backend.fail_writes(false);
        let record = store.insert_optimistic(&payload(100)).unwrap();
        assert_eq!(record.id.temp_id(), Some(TempId::new(2)));
    }

    #[test]
    fn clock_fills_missing_date() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut store = open(&backend).with_clock(|| NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());

        let record = store
            .insert_optimistic(&ExpensePayload::new(Amount::from_cents(1)))
            .unwrap();
        assert_eq!(record.date, date("2025-03-04"));
    }
}
