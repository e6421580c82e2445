//! Sync engine state machine.

use crate::collab::{AuthProvider, ConnectivityOracle};
use crate::config::{RejectionPolicy, SyncConfig};
use crate::error::{FailureKind, SyncError, SyncResult};
use crate::transport::{ReadEndpoint, WriteEndpoint};
use parking_lot::{Mutex, RwLock};
use spendsync_core::{ClientState, ConfirmedExpense, Expense, ExpensePayload, TempId, WriteIntent};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No drain has run yet.
    Idle,
    /// A drain is submitting intents.
    Draining,
    /// The initial fetch is running.
    Fetching,
    /// The last drain ended without a halt.
    Synced,
    /// The last drain halted at a failing intent.
    Halted,
}

impl SyncState {
    /// Returns true if the engine is talking to the server.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Draining | SyncState::Fetching)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Drains run to completion.
    pub drains_completed: u64,
    /// Passes run across all drains.
    pub passes_completed: u64,
    /// Intents the server accepted.
    pub intents_confirmed: u64,
    /// Intents moved to the dead-letter list.
    pub intents_rejected: u64,
    /// Passes that stopped at a failing intent.
    pub halted_passes: u64,
    /// Triggers folded into an already active drain.
    pub coalesced_triggers: u64,
    /// When the last drain finished.
    pub last_drain_time: Option<Instant>,
    /// Last failure message.
    pub last_error: Option<String>,
}

/// Why a trigger did not start a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The connectivity oracle reported offline.
    Offline,
    /// Nothing is queued.
    QueueEmpty,
    /// `trigger` was called outside an async runtime.
    NoRuntime,
}

/// Where and why a pass stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassHalt {
    /// The intent that failed; it is still at the head of the queue.
    pub temp_id: TempId,
    /// Classification of the failure.
    pub kind: FailureKind,
    /// Failure message.
    pub message: String,
}

/// Result of one drain pass over a queue snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Intents in the snapshot.
    pub snapshot_len: usize,
    /// Intents submitted, including the one that halted the pass.
    pub submitted: usize,
    /// Intents confirmed, in submission order.
    pub confirmed: Vec<TempId>,
    /// Intents moved to the dead-letter list.
    pub rejected: Vec<TempId>,
    /// Set when the pass stopped before the end of its snapshot.
    pub halt: Option<PassHalt>,
}

/// Result of a drain: one or more passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Passes in execution order.
    pub passes: Vec<PassReport>,
}

impl DrainReport {
    /// Intents confirmed across all passes.
    pub fn confirmed_count(&self) -> usize {
        self.passes.iter().map(|p| p.confirmed.len()).sum()
    }

    /// Intents dead-lettered across all passes.
    pub fn rejected_count(&self) -> usize {
        self.passes.iter().map(|p| p.rejected.len()).sum()
    }

    /// Submissions across all passes.
    pub fn submitted(&self) -> usize {
        self.passes.iter().map(|p| p.submitted).sum()
    }

    /// The halt of the final pass, if it halted.
    pub fn halt(&self) -> Option<&PassHalt> {
        self.passes.last().and_then(|p| p.halt.as_ref())
    }
}

/// Outcome of an awaited drain request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// This call ran the drain.
    Completed(DrainReport),
    /// Another drain was active; it will run one more pass.
    Coalesced,
    /// Nothing ran.
    Skipped(SkipReason),
}

/// Outcome of a fire-and-forget trigger.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A drain task was spawned.
    Started(DrainHandle),
    /// Another drain was active; it will run one more pass.
    Coalesced,
    /// Nothing ran.
    Skipped(SkipReason),
}

impl TriggerOutcome {
    /// Waits for the spawned drain, if there is one.
    pub async fn wait(self) -> Option<DrainReport> {
        match self {
            TriggerOutcome::Started(handle) => handle.wait().await,
            _ => None,
        }
    }
}

/// Handle to a spawned drain task.
#[derive(Debug)]
pub struct DrainHandle(JoinHandle<DrainReport>);

impl DrainHandle {
    /// Waits for the drain to finish. Returns `None` if the task panicked
    /// or was aborted.
    pub async fn wait(self) -> Option<DrainReport> {
        match self.0.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "drain task did not complete");
                None
            }
        }
    }
}

/// Result of the best-effort initial fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialSync {
    /// Categories and records were fetched and merged.
    Fetched {
        /// Categories received.
        categories: usize,
        /// Server records received.
        records: usize,
    },
    /// The fetch was not attempted.
    Skipped(SkipReason),
    /// The fetch failed; local data stays authoritative.
    Failed {
        /// Classification of the failure.
        kind: FailureKind,
        /// Failure message.
        message: String,
    },
}

#[derive(Debug, Default)]
struct DrainFlags {
    active: bool,
    resync_requested: bool,
}

/// Ownership of the single active drain.
///
/// Releasing happens under the flags lock together with the final check for
/// a resync request, so a trigger is either folded into this drain or free
/// to start the next one.
struct DrainGuard {
    flags: Arc<Mutex<DrainFlags>>,
    released: bool,
}

impl DrainGuard {
    fn acquire(flags: &Arc<Mutex<DrainFlags>>) -> Option<Self> {
        let mut state = flags.lock();
        if state.active {
            state.resync_requested = true;
            return None;
        }
        state.active = true;
        state.resync_requested = false;
        Some(Self {
            flags: Arc::clone(flags),
            released: false,
        })
    }

    /// Consumes a pending resync request and returns true, or releases the
    /// drain (running `on_release` first) and returns false.
    fn continue_or_release(&mut self, may_continue: bool, on_release: impl FnOnce()) -> bool {
        let mut state = self.flags.lock();
        if may_continue && state.resync_requested {
            state.resync_requested = false;
            return true;
        }
        on_release();
        state.active = false;
        state.resync_requested = false;
        self.released = true;
        false
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.released {
            let mut state = self.flags.lock();
            state.active = false;
            state.resync_requested = false;
        }
    }
}

enum Refusal {
    Coalesced,
    Skipped(SkipReason),
}

/// The sync engine drives queued write intents to the remote endpoint.
///
/// Intents go out one at a time in submission order. The first failure
/// halts the pass and leaves the failed intent and everything behind it
/// queued for the next trigger. With [`RejectionPolicy::DeadLetter`] a
/// permanent rejection is parked instead and the pass continues.
pub struct SyncEngine<T: WriteEndpoint> {
    config: SyncConfig,
    endpoint: T,
    client: Arc<ClientState>,
    auth: Arc<dyn AuthProvider>,
    connectivity: Arc<dyn ConnectivityOracle>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    drain: Arc<Mutex<DrainFlags>>,
}

impl<T: WriteEndpoint> SyncEngine<T> {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        endpoint: T,
        client: Arc<ClientState>,
        auth: Arc<dyn AuthProvider>,
        connectivity: Arc<dyn ConnectivityOracle>,
    ) -> Self {
        Self {
            config,
            endpoint,
            client,
            auth,
            connectivity,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            drain: Arc::new(Mutex::new(DrainFlags::default())),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the remote endpoint.
    pub fn endpoint(&self) -> &T {
        &self.endpoint
    }

    /// Gets the client state the engine drains.
    pub fn client(&self) -> &Arc<ClientState> {
        &self.client
    }

    /// Returns true while a drain holds the queue.
    pub fn is_draining(&self) -> bool {
        self.drain.lock().active
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Drains the queue and waits for the result.
    ///
    /// If another drain is active this returns [`DrainOutcome::Coalesced`]
    /// at once and the active drain runs one more pass. Failures never
    /// surface as errors; they are logged and reported in the outcome.
    pub async fn sync_pending(&self) -> DrainOutcome {
        match self.begin_drain() {
            Ok(guard) => DrainOutcome::Completed(self.run_drain(guard).await),
            Err(Refusal::Coalesced) => DrainOutcome::Coalesced,
            Err(Refusal::Skipped(reason)) => DrainOutcome::Skipped(reason),
        }
    }

    fn begin_drain(&self) -> Result<DrainGuard, Refusal> {
        let Some(mut guard) = DrainGuard::acquire(&self.drain) else {
            debug!("drain already active, resync requested");
            self.stats.write().coalesced_triggers += 1;
            return Err(Refusal::Coalesced);
        };

        loop {
            let skip = if !self.connectivity.is_online() {
                Some(SkipReason::Offline)
            } else if self.client.queue_len() == 0 {
                Some(SkipReason::QueueEmpty)
            } else {
                None
            };

            let Some(reason) = skip else {
                return Ok(guard);
            };
            // A trigger that arrived meanwhile may have queued something.
            if !guard.continue_or_release(true, || ()) {
                debug!(?reason, "drain skipped");
                return Err(Refusal::Skipped(reason));
            }
        }
    }

    async fn run_drain(&self, mut guard: DrainGuard) -> DrainReport {
        self.set_state(SyncState::Draining);
        let mut report = DrainReport::default();

        loop {
            let pass = self.drain_pass().await;
            self.record_pass(&pass);
            report.passes.push(pass);

            let may_continue = report.passes.len() < self.config.max_passes_per_drain
                && self.connectivity.is_online();
            let final_state = if report.halt().is_some() {
                SyncState::Halted
            } else {
                SyncState::Synced
            };
            let continued = guard.continue_or_release(may_continue, || {
                self.set_state(final_state);
                let mut stats = self.stats.write();
                stats.drains_completed += 1;
                stats.last_drain_time = Some(Instant::now());
            });
            if !continued {
                break;
            }
            debug!(passes = report.passes.len(), "resync requested during drain, running another pass");
        }

        info!(
            passes = report.passes.len(),
            confirmed = report.confirmed_count(),
            rejected = report.rejected_count(),
            halted = report.halt().is_some(),
            "drain finished"
        );
        report
    }

    async fn drain_pass(&self) -> PassReport {
        let snapshot = self.client.pending_snapshot();
        let mut pass = PassReport {
            snapshot_len: snapshot.len(),
            ..PassReport::default()
        };
        debug!(queued = snapshot.len(), "drain pass started");

        for intent in snapshot {
            let temp_id = intent.temp_id;
            pass.submitted += 1;

            let err = match self.submit(&intent).await {
                Ok(confirmed) => match self.apply_confirmation(temp_id, confirmed) {
                    Ok(()) => {
                        pass.confirmed.push(temp_id);
                        continue;
                    }
                    Err(e) => e,
                },
                Err(e) => e,
            };

            if err.kind() == FailureKind::Permanent
                && self.config.rejection_policy == RejectionPolicy::DeadLetter
            {
                match self.client.reject(temp_id, err.to_string(), err.status()) {
                    Ok(_) => {
                        warn!(temp_id = %temp_id, error = %err, "intent rejected by server, moved to dead letters");
                        pass.rejected.push(temp_id);
                        continue;
                    }
                    Err(e) => {
                        let err = SyncError::from(e);
                        self.log_halt(temp_id, &err);
                        pass.halt = Some(halt(temp_id, &err));
                        break;
                    }
                }
            }

            self.log_halt(temp_id, &err);
            pass.halt = Some(halt(temp_id, &err));
            break;
        }

        pass
    }

    async fn submit(&self, intent: &WriteIntent) -> SyncResult<ConfirmedExpense> {
        // Read per intent: a refresh may land between two submissions.
        let token = self
            .auth
            .current_token()
            .ok_or(SyncError::MissingCredential)?;
        debug!(temp_id = %intent.temp_id, multipart = intent.has_attachment, "submitting intent");
        self.endpoint.create_expense(intent, &token).await
    }

    fn apply_confirmation(&self, temp_id: TempId, confirmed: ConfirmedExpense) -> SyncResult<()> {
        let remote_id = confirmed.id;
        let reconciled = self.client.confirm(temp_id, confirmed)?;
        if reconciled {
            info!(temp_id = %temp_id, remote_id, "expense confirmed");
        } else {
            debug!(temp_id = %temp_id, remote_id, "expense confirmed, record no longer present");
        }
        Ok(())
    }

    fn log_halt(&self, temp_id: TempId, err: &SyncError) {
        match err.kind() {
            FailureKind::Authentication => {
                warn!(target: "spendsync::auth", temp_id = %temp_id, error = %err, "authentication failed, drain halted");
            }
            FailureKind::Transient => {
                warn!(temp_id = %temp_id, error = %err, "submission failed, drain halted");
            }
            FailureKind::Permanent => {
                warn!(temp_id = %temp_id, error = %err, status = ?err.status(), "submission rejected, drain halted");
            }
            FailureKind::Local => {
                error!(temp_id = %temp_id, error = %err, "could not persist sync result, drain halted");
            }
            FailureKind::Client => {
                error!(temp_id = %temp_id, error = %err, "request could not be sent, check the configuration; drain halted");
            }
        }
    }

    fn record_pass(&self, pass: &PassReport) {
        let mut stats = self.stats.write();
        stats.passes_completed += 1;
        stats.intents_confirmed += pass.confirmed.len() as u64;
        stats.intents_rejected += pass.rejected.len() as u64;
        match &pass.halt {
            Some(h) => {
                stats.halted_passes += 1;
                stats.last_error = Some(h.message.clone());
            }
            None => stats.last_error = None,
        }
    }
}

impl<T: WriteEndpoint + 'static> SyncEngine<T> {
    /// Starts a drain in the background and returns without waiting.
    ///
    /// This is what user actions and reconnect handlers call. The returned
    /// handle may be dropped; the drain keeps running.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, drain not started");
            return TriggerOutcome::Skipped(SkipReason::NoRuntime);
        };

        match self.begin_drain() {
            Ok(guard) => {
                let engine = Arc::clone(self);
                let task = runtime.spawn(async move { engine.run_drain(guard).await });
                TriggerOutcome::Started(DrainHandle(task))
            }
            Err(Refusal::Coalesced) => TriggerOutcome::Coalesced,
            Err(Refusal::Skipped(reason)) => TriggerOutcome::Skipped(reason),
        }
    }

    /// Records an expense locally, queues its intent, and triggers a drain.
    ///
    /// Returns the optimistic record as soon as it is persisted. Only local
    /// persistence errors are reported; sync failures never are.
    pub fn record_expense(
        self: &Arc<Self>,
        payload: ExpensePayload,
    ) -> SyncResult<(Expense, TriggerOutcome)> {
        let record = self.client.record_expense(payload)?;
        debug!(id = ?record.id, "expense recorded");
        Ok((record, self.trigger()))
    }

    /// Spawns a task that triggers a drain every `auto_sync_interval`.
    ///
    /// Returns `None` when no interval is configured or no runtime is
    /// available. The task ends once the engine is dropped.
    pub fn spawn_auto_sync(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = self.config.auto_sync_interval?;
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let engine = Arc::downgrade(self);

        info!(interval_secs = interval.as_secs_f64(), "auto sync started");
        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    debug!("engine dropped, auto sync stopped");
                    break;
                };
                let outcome = engine.trigger();
                drop(engine);
                outcome.wait().await;
            }
        }))
    }
}

impl<T: WriteEndpoint + ReadEndpoint> SyncEngine<T> {
    /// Fetches categories and records and merges them into local state.
    ///
    /// Best-effort: failures are logged and the local snapshot stays
    /// authoritative. Pending records are never dropped by the merge.
    pub async fn fetch_initial_data(&self) -> InitialSync {
        if !self.connectivity.is_online() {
            debug!("offline, initial fetch skipped");
            return InitialSync::Skipped(SkipReason::Offline);
        }

        let previous = self.state();
        self.set_state(SyncState::Fetching);
        let result = self.fetch_remote().await;
        {
            let mut state = self.state.write();
            if *state == SyncState::Fetching {
                *state = previous;
            }
        }

        match result {
            Ok((categories, records)) => {
                info!(categories, records, "initial data fetched");
                InitialSync::Fetched {
                    categories,
                    records,
                }
            }
            Err(err) => {
                if err.kind() == FailureKind::Authentication {
                    warn!(target: "spendsync::auth", error = %err, "initial fetch unauthorized, showing local data only");
                } else {
                    warn!(error = %err, "error syncing records, showing local data only");
                }
                InitialSync::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        }
    }

    async fn fetch_remote(&self) -> SyncResult<(usize, usize)> {
        let token = self
            .auth
            .current_token()
            .ok_or(SyncError::MissingCredential)?;

        let categories = self.endpoint.list_categories(&token).await?;
        let category_count = categories.len();
        self.client.replace_categories(categories)?;

        let records = self.endpoint.list_expenses(&token).await?;
        let record_count = records.len();
        self.client.merge_remote(records)?;

        Ok((category_count, record_count))
    }

    /// Pushes pending writes, then refreshes from the server.
    ///
    /// Draining first means freshly confirmed records are already in the
    /// server list the merge receives.
    pub async fn resync(&self) -> (DrainOutcome, InitialSync) {
        let drained = self.sync_pending().await;
        let fetched = self.fetch_initial_data().await;
        (drained, fetched)
    }
}

fn halt(temp_id: TempId, err: &SyncError) -> PassHalt {
    PassHalt {
        temp_id,
        kind: err.kind(),
        message: err.to_string(),
    }
}
