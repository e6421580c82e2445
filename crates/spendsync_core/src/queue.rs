//! Pending write queue.

use crate::error::{CoreError, CoreResult};
use crate::id::TempId;
use crate::model::{ConfirmedExpense, ExpensePayload};
use crate::persist::{self, ACKNOWLEDGED_KEY, DEAD_LETTERS_KEY, QUEUE_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spendsync_storage::StorageBackend;
use std::collections::VecDeque;
use std::sync::Arc;

/// A queued, not-yet-confirmed request to create a remote record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteIntent {
    /// Identity of the optimistic record this intent confirms.
    pub temp_id: TempId,
    /// The payload exactly as the user submitted it.
    pub payload: ExpensePayload,
    /// Whether the payload must be sent as a multipart upload.
    pub has_attachment: bool,
}

/// A write intent the server rejected as permanently invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The rejected intent.
    pub intent: WriteIntent,
    /// Server or client explanation.
    pub reason: String,
    /// HTTP status of the rejection, if there was one.
    pub status: Option<u16>,
    /// When the rejection was recorded.
    pub rejected_at: DateTime<Utc>,
}

/// A server acknowledgment whose reconciliation may not be on disk yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    /// The intent the server accepted.
    pub temp_id: TempId,
    /// The record the server returned.
    pub confirmed: ConfirmedExpense,
}

/// Durable FIFO of write intents awaiting server confirmation.
///
/// # Invariants
///
/// - Intents are kept in submission order
/// - At most one intent (live or rejected) exists per temporary id
/// - `enqueue` and `remove` persist the whole queue before returning
/// - An acknowledged intent is journaled before it leaves the queue, so a
///   write the server accepted is never queued again after a restart
///
/// Rejected intents are parked in a separate dead-letter list so they stop
/// blocking the intents behind them; they can be requeued or discarded.
pub struct PendingWriteQueue {
    backend: Arc<dyn StorageBackend>,
    intents: VecDeque<WriteIntent>,
    dead_letters: Vec<DeadLetter>,
    acknowledged: Vec<Acknowledgment>,
}

impl PendingWriteQueue {
    /// Opens the queue, loading persisted intents and dead letters.
    ///
    /// An intent found both in the queue and among the dead letters (a crash
    /// between the two writes of a rejection) stays queued; the server will
    /// reject it again if it is still invalid. An intent that also has a
    /// journaled acknowledgment was accepted already and is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted state cannot be read or decoded.
    pub fn open(backend: Arc<dyn StorageBackend>) -> CoreResult<Self> {
        let mut intents: VecDeque<WriteIntent> =
            persist::load(backend.as_ref(), QUEUE_KEY)?.unwrap_or_default();
        let mut dead_letters: Vec<DeadLetter> =
            persist::load(backend.as_ref(), DEAD_LETTERS_KEY)?.unwrap_or_default();
        let acknowledged: Vec<Acknowledgment> =
            persist::load(backend.as_ref(), ACKNOWLEDGED_KEY)?.unwrap_or_default();

        let queued = intents.len();
        intents.retain(|i| !acknowledged.iter().any(|a| a.temp_id == i.temp_id));
        if intents.len() != queued {
            tracing::warn!(
                dropped = queued - intents.len(),
                "acknowledged intents still present in the live queue, dropping them"
            );
        }

        let before = dead_letters.len();
        dead_letters.retain(|d| !intents.iter().any(|i| i.temp_id == d.intent.temp_id));
        if dead_letters.len() != before {
            tracing::warn!(
                dropped = before - dead_letters.len(),
                "dead letters still present in the live queue, keeping the queued copies"
            );
        }

        tracing::debug!(
            queued = intents.len(),
            dead_letters = dead_letters.len(),
            acknowledged = acknowledged.len(),
            "pending write queue opened"
        );

        Ok(Self {
            backend,
            intents,
            dead_letters,
            acknowledged,
        })
    }

    /// Appends an intent to the tail of the queue.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DuplicateIntent`] if `temp_id` already has an intent
    /// - A storage error if the queue cannot be persisted; the intent is not
    ///   queued in that case
    pub fn enqueue(
        &mut self,
        temp_id: TempId,
        payload: ExpensePayload,
        has_attachment: bool,
    ) -> CoreResult<()> {
        if self.contains(temp_id)
            || self.dead_letter(temp_id).is_some()
            || self.acknowledgment(temp_id).is_some()
        {
            return Err(CoreError::DuplicateIntent(temp_id));
        }

        self.intents.push_back(WriteIntent {
            temp_id,
            payload,
            has_attachment,
        });

        if let Err(e) = self.persist_intents() {
            self.intents.pop_back();
            return Err(e);
        }

        tracing::debug!(temp_id = %temp_id, queued = self.intents.len(), "write intent queued");
        Ok(())
    }

    /// Returns a copy of the queue in submission order.
    #[must_use]
    pub fn peek_from_head(&self) -> Vec<WriteIntent> {
        self.intents.iter().cloned().collect()
    }

    /// Removes the intent for `temp_id`, wherever it sits in the queue.
    ///
    /// Returns `false` if there is no such intent.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails. The intent stays removed in
    /// memory regardless, so a write the server already acknowledged is
    /// never submitted twice by this process; the next successful persist
    /// rewrites the full queue.
    pub fn remove(&mut self, temp_id: TempId) -> CoreResult<bool> {
        let Some(index) = self.position(temp_id) else {
            return Ok(false);
        };
        self.intents.remove(index);
        self.persist_intents()?;

        tracing::debug!(temp_id = %temp_id, queued = self.intents.len(), "write intent removed");
        Ok(true)
    }

    /// Replaces the intent for `temp_id` with a journaled acknowledgment.
    ///
    /// The journal is written before the queue, so a crash in between
    /// leaves the acknowledgment on disk and [`Self::open`] drops the stale
    /// intent. Call [`Self::settle`] once the confirmed record is persisted.
    /// Returns `false` if there is no such intent.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails. Like [`Self::remove`], the
    /// intent stays out of the in-memory queue regardless.
    pub fn acknowledge(&mut self, temp_id: TempId, confirmed: ConfirmedExpense) -> CoreResult<bool> {
        let Some(index) = self.position(temp_id) else {
            return Ok(false);
        };
        self.intents.remove(index);
        self.acknowledged.push(Acknowledgment { temp_id, confirmed });

        self.persist_acknowledged()?;
        self.persist_intents()?;

        tracing::debug!(temp_id = %temp_id, queued = self.intents.len(), "write intent acknowledged");
        Ok(true)
    }

    /// Drops the journaled acknowledgment for `temp_id`. Missing entries are
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn settle(&mut self, temp_id: TempId) -> CoreResult<()> {
        let before = self.acknowledged.len();
        self.acknowledged.retain(|a| a.temp_id != temp_id);
        if self.acknowledged.len() == before {
            return Ok(());
        }
        self.persist_acknowledged()
    }

    /// Returns the acknowledgment journaled for `temp_id`, if any.
    #[must_use]
    pub fn acknowledgment(&self, temp_id: TempId) -> Option<&Acknowledgment> {
        self.acknowledged.iter().find(|a| a.temp_id == temp_id)
    }

    /// Returns acknowledgments whose reconciliation is not settled yet.
    #[must_use]
    pub fn acknowledgments(&self) -> &[Acknowledgment] {
        &self.acknowledged
    }

    /// Moves the intent for `temp_id` to the dead-letter list.
    ///
    /// Returns `false` if there is no such intent.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn reject(
        &mut self,
        temp_id: TempId,
        reason: impl Into<String>,
        status: Option<u16>,
    ) -> CoreResult<bool> {
        let Some(index) = self.position(temp_id) else {
            return Ok(false);
        };
        let Some(intent) = self.intents.remove(index) else {
            return Ok(false);
        };

        self.dead_letters.push(DeadLetter {
            intent,
            reason: reason.into(),
            status,
            rejected_at: Utc::now(),
        });

        // Dead letters first: a crash in between leaves the intent queued.
        self.persist_dead_letters()?;
        self.persist_intents()?;
        Ok(true)
    }

    /// Moves a rejected intent back to the tail of the queue.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnknownDeadLetter`] if `temp_id` was never rejected
    /// - A storage error if persisting fails
    pub fn requeue(&mut self, temp_id: TempId) -> CoreResult<()> {
        let index = self
            .dead_letters
            .iter()
            .position(|d| d.intent.temp_id == temp_id)
            .ok_or(CoreError::UnknownDeadLetter(temp_id))?;

        let letter = self.dead_letters.remove(index);
        self.intents.push_back(letter.intent);

        // Queue first: a crash in between leaves the intent queued.
        self.persist_intents()?;
        self.persist_dead_letters()?;

        tracing::info!(temp_id = %temp_id, "rejected write intent requeued");
        Ok(())
    }

    /// Drops a rejected intent for good.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnknownDeadLetter`] if `temp_id` was never rejected
    /// - A storage error if persisting fails
    pub fn discard(&mut self, temp_id: TempId) -> CoreResult<DeadLetter> {
        let index = self
            .dead_letters
            .iter()
            .position(|d| d.intent.temp_id == temp_id)
            .ok_or(CoreError::UnknownDeadLetter(temp_id))?;

        let letter = self.dead_letters.remove(index);
        self.persist_dead_letters()?;
        Ok(letter)
    }

    /// Returns true if a live intent exists for `temp_id`.
    #[must_use]
    pub fn contains(&self, temp_id: TempId) -> bool {
        self.position(temp_id).is_some()
    }

    /// Returns the dead letter for `temp_id`, if any.
    #[must_use]
    pub fn dead_letter(&self, temp_id: TempId) -> Option<&DeadLetter> {
        self.dead_letters.iter().find(|d| d.intent.temp_id == temp_id)
    }

    /// Returns all rejected intents, oldest rejection first.
    #[must_use]
    pub fn dead_letters(&self) -> &[DeadLetter] {
        &self.dead_letters
    }

    /// Returns the highest temporary id referenced by any intent.
    #[must_use]
    pub fn max_temp_id(&self) -> Option<TempId> {
        self.intents
            .iter()
            .map(|i| i.temp_id)
            .chain(self.dead_letters.iter().map(|d| d.intent.temp_id))
            .chain(self.acknowledged.iter().map(|a| a.temp_id))
            .max()
    }

    /// Returns the number of live intents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// Returns true if no live intent is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    fn position(&self, temp_id: TempId) -> Option<usize> {
        self.intents.iter().position(|i| i.temp_id == temp_id)
    }

    fn persist_intents(&self) -> CoreResult<()> {
        persist::save(self.backend.as_ref(), QUEUE_KEY, &self.intents)
    }

    fn persist_dead_letters(&self) -> CoreResult<()> {
        persist::save(self.backend.as_ref(), DEAD_LETTERS_KEY, &self.dead_letters)
    }

    fn persist_acknowledged(&self) -> CoreResult<()> {
        persist::save(self.backend.as_ref(), ACKNOWLEDGED_KEY, &self.acknowledged)
    }
}

impl std::fmt::Debug for PendingWriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWriteQueue")
            .field("intents", &self.intents.len())
            .field("dead_letters", &self.dead_letters.len())
            .field("acknowledged", &self.acknowledged.len())
            .finish()
    }
}
