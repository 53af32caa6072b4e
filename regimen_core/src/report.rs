//! Reporting over recorded occurrences: a history calendar and CSV export.

use crate::{Occurrence, Outcome, Result, ScheduledItemState};
use chrono::{DateTime, Duration, FixedOffset};
use std::io::Write;

/// Length of the window a history entry occupies
pub const HISTORY_ENTRY_LENGTH_MINUTES: i64 = 5;

/// One recorded occurrence placed on a calendar
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub uid: String,
    pub item_id: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub outcome: Outcome,
    pub summary: String,
    pub description: String,
}

impl HistoryEntry {
    fn new(item: &ScheduledItemState, occurrence: &Occurrence) -> Self {
        let label = item.label();
        let start = occurrence.timestamp;
        let verb = match occurrence.outcome {
            Outcome::Taken => "Taken",
            Outcome::Skipped => "Skipped",
        };

        let mut description = vec![
            format!("Medication: {}", label.name),
            format!("Dosage: {}", label.dosage),
            format!("Status: {}", verb),
            format!("Time: {}", start.format("%I:%M %p")),
        ];
        if !occurrence.notes.is_empty() {
            description.push(format!("Notes: {}", occurrence.notes));
        }
        description.push(format!("Frequency: {}", item.rule().frequency));

        Self {
            uid: format!("{}_{}", item.id(), start.to_rfc3339()),
            item_id: item.id().to_string(),
            start,
            end: start + Duration::minutes(HISTORY_ENTRY_LENGTH_MINUTES),
            outcome: occurrence.outcome,
            summary: format!("{}: {} ({})", verb, label.name, label.dosage),
            description: description.join("\n"),
        }
    }
}

/// Every occurrence with `start <= timestamp <= end`, sorted by start.
pub fn history_entries<'a, I>(
    items: I,
    start: &DateTime<FixedOffset>,
    end: &DateTime<FixedOffset>,
) -> Vec<HistoryEntry>
where
    I: IntoIterator<Item = &'a ScheduledItemState>,
{
    let (start, end) = (*start, *end);
    let mut entries: Vec<HistoryEntry> = items
        .into_iter()
        .flat_map(move |item| {
            item.ledger()
                .history()
                .iter()
                .filter(move |o| o.timestamp >= start && o.timestamp <= end)
                .map(move |o| HistoryEntry::new(item, o))
        })
        .collect();

    entries.sort_by_key(|entry| entry.start);
    entries
}

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    item_id: &'a str,
    name: &'a str,
    timestamp: String,
    outcome: &'static str,
    notes: &'a str,
}

/// Write the full occurrence history of `items` as CSV.
///
/// Rows follow item order, then ledger insertion order. Returns the number
/// of rows written.
pub fn write_history_csv<'a, I, W>(items: I, writer: W) -> Result<usize>
where
    I: IntoIterator<Item = &'a ScheduledItemState>,
    W: Write,
{
    let mut writer = csv::Writer::from_writer(writer);
    let mut count = 0;

    for item in items {
        for occurrence in item.ledger().history() {
            writer.serialize(CsvRow {
                item_id: item.id(),
                name: &item.label().name,
                timestamp: occurrence.timestamp.to_rfc3339(),
                outcome: occurrence.outcome.as_str(),
                notes: &occurrence.notes,
            })?;
            count += 1;
        }
    }

    // Headers only come from serialized rows
    if count == 0 {
        writer.write_record(["item_id", "name", "timestamp", "outcome", "notes"])?;
    }

    writer.flush()?;
    tracing::info!("Exported {} occurrences to CSV", count);
    Ok(count)
}
