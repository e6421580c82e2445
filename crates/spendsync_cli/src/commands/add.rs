//! Add command implementation.

use super::{open_engine, CommandResult, Settings};
use chrono::NaiveDate;
use spendsync_core::{Amount, Attachment, ExpensePayload, TransactionType};
use std::path::{Path, PathBuf};

/// Arguments of `spendsync add`.
#[derive(Debug, clap::Args)]
pub struct AddArgs {
    /// Amount, e.g. 42.50
    #[arg(allow_hyphen_values = true)]
    pub amount: Amount,

    /// Booking date (YYYY-MM-DD); defaults to today
    #[arg(short, long)]
    pub date: Option<NaiveDate>,

    /// Category id
    #[arg(short, long)]
    pub category: Option<u64>,

    /// Free-form note
    #[arg(short = 'm', long)]
    pub description: Option<String>,

    /// Record income instead of an expense
    #[arg(long)]
    pub income: bool,

    /// Receipt file to upload with the expense
    #[arg(short, long)]
    pub receipt: Option<PathBuf>,
}

impl AddArgs {
    fn into_payload(self) -> CommandResult<ExpensePayload> {
        let kind = if self.income {
            TransactionType::Income
        } else {
            TransactionType::Expense
        };
        let mut payload = ExpensePayload::new(self.amount).with_type(kind);
        payload.date = self.date;
        payload.category = self.category;
        payload.description = self.description;
        if let Some(path) = &self.receipt {
            payload.receipt = Some(read_receipt(path)?);
        }
        Ok(payload)
    }
}

fn read_receipt(path: &Path) -> CommandResult<Attachment> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("cannot read receipt {}: {e}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("receipt path has no file name: {}", path.display()))?;
    Ok(Attachment {
        content_type: content_type(&file_name).into(),
        file_name,
        bytes,
    })
}

fn content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Runs the add command.
///
/// The expense is persisted before anything touches the network. The
/// command then waits for the drain it triggered so the process does not
/// exit mid-submission.
pub async fn run(settings: &Settings, args: AddArgs) -> CommandResult {
    let payload = args.into_payload()?;
    let engine = open_engine(settings, settings.sync_config())?;

    let (record, outcome) = engine.record_expense(payload)?;
    println!(
        "Recorded {} {} on {} as {}",
        record.transaction_type.as_str(),
        record.amount,
        record.date,
        record.id
    );

    let temp_id = record.id.temp_id();
    let Some(report) = outcome.wait().await else {
        println!("Queued for sync ({} pending)", engine.client().queue_len());
        return Ok(());
    };

    let confirmed = temp_id.is_some_and(|t| report.passes.iter().any(|p| p.confirmed.contains(&t)));
    let rejected = temp_id.is_some_and(|t| report.passes.iter().any(|p| p.rejected.contains(&t)));
    if confirmed {
        // Reconciled in place, so the head is still this record.
        if let Some(head) = engine.client().expenses().first() {
            println!("Synced as {}", head.id);
        }
    } else if rejected {
        println!("Rejected by the server; see `spendsync pending`");
    } else {
        match report.halt() {
            Some(halt) => println!("Still pending: {}", halt.message),
            None => println!("Still pending"),
        }
    }
    Ok(())
}
