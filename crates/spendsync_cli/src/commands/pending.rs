//! Pending, retry and discard command implementations.

use super::{open_state, print_json, CommandResult, Format, Settings};
use serde::Serialize;
use spendsync_core::{DeadLetter, TempId, WriteIntent};

/// What `pending --format json` prints.
#[derive(Debug, Serialize)]
pub struct PendingReport {
    /// Queued intents, head first.
    pub queued: Vec<QueuedEntry>,
    /// Rejected intents.
    pub dead_letters: Vec<DeadLetterEntry>,
}

/// A queued intent without its attachment bytes.
#[derive(Debug, Serialize)]
pub struct QueuedEntry {
    /// Temporary id.
    pub temp_id: TempId,
    /// Amount as text.
    pub amount: String,
    /// Whether a receipt is attached.
    pub has_attachment: bool,
}

/// A dead letter without its attachment bytes.
#[derive(Debug, Serialize)]
pub struct DeadLetterEntry {
    /// Temporary id.
    pub temp_id: TempId,
    /// Rejection reason.
    pub reason: String,
    /// HTTP status.
    pub status: Option<u16>,
    /// When it was rejected (RFC 3339).
    pub rejected_at: String,
}

impl From<&WriteIntent> for QueuedEntry {
    fn from(intent: &WriteIntent) -> Self {
        Self {
            temp_id: intent.temp_id,
            amount: intent.payload.amount.to_string(),
            has_attachment: intent.has_attachment,
        }
    }
}

impl From<&DeadLetter> for DeadLetterEntry {
    fn from(letter: &DeadLetter) -> Self {
        Self {
            temp_id: letter.intent.temp_id,
            reason: letter.reason.clone(),
            status: letter.status,
            rejected_at: letter.rejected_at.to_rfc3339(),
        }
    }
}

/// Runs the pending command.
pub fn show(settings: &Settings, format: Format) -> CommandResult {
    let state = open_state(settings)?;
    let report = PendingReport {
        queued: state.pending_snapshot().iter().map(QueuedEntry::from).collect(),
        dead_letters: state.dead_letters().iter().map(DeadLetterEntry::from).collect(),
    };

    match format {
        Format::Json => print_json(&report)?,
        Format::Text => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &PendingReport) {
    println!("Queued: {}", report.queued.len());
    for entry in &report.queued {
        let receipt = if entry.has_attachment { "  +receipt" } else { "" };
        println!("  {:<8} {:>10}{}", entry.temp_id.to_string(), entry.amount, receipt);
    }

    if !report.dead_letters.is_empty() {
        println!();
        println!("Rejected: {}", report.dead_letters.len());
        for letter in &report.dead_letters {
            let status = letter
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".into());
            println!(
                "  {:<8} {}  {}  {}",
                letter.temp_id.to_string(),
                status,
                letter.rejected_at,
                letter.reason
            );
        }
        println!();
        println!("Fix the cause, then `spendsync retry <id>` or `spendsync discard <id>`");
    }
}

/// Runs the retry command.
pub fn retry(settings: &Settings, temp_id: TempId) -> CommandResult {
    let state = open_state(settings)?;
    state.requeue_rejected(temp_id)?;
    println!("{temp_id} requeued; it will be sent on the next sync");
    Ok(())
}

/// Runs the discard command.
pub fn discard(settings: &Settings, temp_id: TempId) -> CommandResult {
    let state = open_state(settings)?;
    let letter = state.discard_rejected(temp_id)?;
    println!(
        "{temp_id} discarded ({} {})",
        letter.intent.payload.transaction_type.as_str(),
        letter.intent.payload.amount
    );
    Ok(())
}
