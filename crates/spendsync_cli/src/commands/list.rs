//! List and categories command implementations.

use super::{open_state, print_json, CommandResult, Format, Settings};
use spendsync_core::{Category, Expense, TransactionType};

/// Runs the list command.
pub fn records(settings: &Settings, format: Format) -> CommandResult {
    let state = open_state(settings)?;
    let records = state.expenses();

    match format {
        Format::Json => print_json(&records)?,
        Format::Text => {
            if records.is_empty() {
                println!("No records");
            }
            for record in &records {
                println!("{}", record_line(record));
            }
        }
    }
    Ok(())
}

fn record_line(record: &Expense) -> String {
    let category = match (&record.category_name, record.category) {
        (Some(name), _) => name.clone(),
        (None, Some(id)) => format!("#{id}"),
        (None, None) => "-".into(),
    };
    let sign = if record.transaction_type == TransactionType::Income {
        "+"
    } else {
        "-"
    };
    let mut line = format!(
        "{:<8} {}  {}{:>10}  {:<16}",
        record.id.to_string(),
        record.date,
        sign,
        record.amount.to_string(),
        category
    );
    if let Some(description) = &record.description {
        line.push(' ');
        line.push_str(description);
    }
    if record.is_pending() {
        line.push_str("  [pending]");
    }
    line
}

/// Runs the categories command.
pub fn categories(settings: &Settings, format: Format) -> CommandResult {
    let state = open_state(settings)?;
    let categories = state.categories();

    match format {
        Format::Json => print_json(&categories)?,
        Format::Text => {
            if categories.is_empty() {
                println!("No categories cached; run `spendsync sync` while online");
            }
            for category in &categories {
                println!("{}", category_line(category));
            }
        }
    }
    Ok(())
}

fn category_line(category: &Category) -> String {
    let parent = category
        .parent
        .map(|p| format!(" (under #{p})"))
        .unwrap_or_default();
    format!(
        "#{:<4} {:<20} {}{}",
        category.id,
        category.name,
        category.kind.as_str(),
        parent
    )
}
