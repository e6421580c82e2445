//! Sync and watch command implementations.

use super::{open_engine, CommandResult, Settings};
use spendsync_sync::{DrainOutcome, InitialSync, SkipReason};
use std::time::Duration;

/// Runs the sync command: drain the queue, then refresh local data.
pub async fn run(settings: &Settings) -> CommandResult {
    let engine = open_engine(settings, settings.sync_config())?;
    let (drained, fetched) = engine.resync().await;

    println!("{}", describe_drain(&drained));
    println!("{}", describe_fetch(&fetched));

    let stats = engine.stats();
    let client = engine.client();
    println!(
        "{} records, {} pending, {} rejected ({} confirmed this run)",
        client.expenses().len(),
        client.pending_count(),
        client.dead_letters().len(),
        stats.intents_confirmed
    );
    Ok(())
}

/// Runs the watch command: drain every `interval` until Ctrl-C.
pub async fn watch(settings: &Settings, interval: Duration) -> CommandResult {
    let config = settings.sync_config().with_auto_sync_interval(interval);
    let engine = open_engine(settings, config)?;

    if let InitialSync::Failed { message, .. } = engine.fetch_initial_data().await {
        println!("Initial fetch failed, continuing with local data: {message}");
    }

    let Some(task) = engine.spawn_auto_sync() else {
        return Err("auto sync could not be started".into());
    };
    println!(
        "Watching {} pending intents every {}s; Ctrl-C to stop",
        engine.client().queue_len(),
        interval.as_secs()
    );

    tokio::signal::ctrl_c().await?;
    task.abort();

    let stats = engine.stats();
    println!(
        "Stopped after {} drains: {} confirmed, {} rejected, {} still queued",
        stats.drains_completed,
        stats.intents_confirmed,
        stats.intents_rejected,
        engine.client().queue_len()
    );
    Ok(())
}

fn describe_drain(outcome: &DrainOutcome) -> String {
    match outcome {
        DrainOutcome::Completed(report) => {
            let mut line = format!(
                "Pushed {} of {} submitted",
                report.confirmed_count(),
                report.submitted()
            );
            if report.rejected_count() > 0 {
                line.push_str(&format!(", {} rejected", report.rejected_count()));
            }
            if let Some(halt) = report.halt() {
                line.push_str(&format!("; halted at {}: {}", halt.temp_id, halt.message));
            }
            line
        }
        DrainOutcome::Coalesced => "Another drain is already running".into(),
        DrainOutcome::Skipped(SkipReason::Offline) => "Offline, nothing pushed".into(),
        DrainOutcome::Skipped(SkipReason::QueueEmpty) => "Nothing to push".into(),
        DrainOutcome::Skipped(SkipReason::NoRuntime) => "Drain could not start".into(),
    }
}

fn describe_fetch(outcome: &InitialSync) -> String {
    match outcome {
        InitialSync::Fetched {
            categories,
            records,
        } => format!("Fetched {categories} categories and {records} records"),
        InitialSync::Skipped(_) => "Offline, showing local data".into(),
        InitialSync::Failed { message, .. } => {
            format!("Refresh failed, showing local data: {message}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::settings;
    use spendsync_core::TempId;
    use spendsync_sync::{DrainReport, FailureKind, PassHalt, PassReport};

    #[test]
    fn halted_drain_is_described() {
        let outcome = DrainOutcome::Completed(DrainReport {
            passes: vec![PassReport {
                snapshot_len: 2,
                submitted: 1,
                halt: Some(PassHalt {
                    temp_id: TempId::new(4),
                    kind: FailureKind::Transient,
                    message: "operation timed out".into(),
                }),
                ..PassReport::default()
            }],
        });
        let text = describe_drain(&outcome);
        assert!(text.contains("Pushed 0 of 1"));
        assert!(text.contains("tmp-4"));
    }

    #[tokio::test]
    async fn offline_sync_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        run(&settings(dir.path())).await.unwrap();
    }

    #[test]
    fn fetch_failure_is_described() {
        let text = describe_fetch(&InitialSync::Failed {
            kind: FailureKind::Transient,
            message: "server error (500): boom".into(),
        });
        assert!(text.contains("boom"));
    }
}
