//! Append-only occurrence history for one scheduled item.
//!
//! The ledger never removes or reorders entries. Insertion order is the
//! order in which doses were recorded, which may differ from timestamp order
//! when callers backdate a record.

use crate::{Occurrence, Outcome};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

/// Ordered history of taken and skipped doses
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccurrenceLedger {
    history: Vec<Occurrence>,
}

impl OccurrenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from stored history, preserving its order.
    pub fn from_history(history: Vec<Occurrence>) -> Self {
        Self { history }
    }

    /// Append an occurrence.
    ///
    /// Callers holding a cached next-due must drop it afterwards; the owning
    /// [`crate::ScheduledItemState`] does this for you.
    pub fn record(
        &mut self,
        outcome: Outcome,
        timestamp: DateTime<FixedOffset>,
        notes: impl Into<String>,
    ) -> &Occurrence {
        self.history.push(Occurrence::new(outcome, timestamp, notes));
        tracing::debug!("Recorded {} at {}", outcome, timestamp.to_rfc3339());
        &self.history[self.history.len() - 1]
    }

    pub fn history(&self) -> &[Occurrence] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Most recently recorded entry, regardless of outcome.
    pub fn latest(&self) -> Option<&Occurrence> {
        self.history.last()
    }

    /// Timestamp of the most recently recorded taken dose.
    pub fn last_taken(&self) -> Option<DateTime<FixedOffset>> {
        self.history
            .iter()
            .rev()
            .find(|o| o.is_taken())
            .map(|o| o.timestamp)
    }

    pub fn taken_count(&self) -> usize {
        self.history.iter().filter(|o| o.is_taken()).count()
    }

    /// Number of skipped doses.
    pub fn missed_count(&self) -> usize {
        self.history.len() - self.taken_count()
    }

    /// Share of taken doses as a percentage in `[0, 100]`; 0 when empty.
    pub fn adherence_rate(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        (self.taken_count() as f64 / self.history.len() as f64) * 100.0
    }

    /// Whether anything (taken or skipped) was recorded on `date` in `tz`.
    pub fn has_occurrence_on<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> bool {
        self.history.iter().any(|o| o.date_in(tz) == date)
    }

    /// Most recent entry recorded for `date`.
    ///
    /// Scans from the newest entry and stops at the first one dated before
    /// `date`; entries dated after it are passed over.
    pub fn latest_on<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> Option<&Occurrence> {
        for occurrence in self.history.iter().rev() {
            let recorded_on = occurrence.date_in(tz);
            if recorded_on == date {
                return Some(occurrence);
            }
            if recorded_on < date {
                break;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 8, day, hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_empty_ledger_aggregates() {
        let ledger = OccurrenceLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.last_taken(), None);
        assert_eq!(ledger.missed_count(), 0);
        assert_eq!(ledger.adherence_rate(), 0.0);
    }

    #[test]
    fn test_last_taken_scans_from_end() {
        let mut ledger = OccurrenceLedger::new();
        ledger.record(Outcome::Taken, at(1, 9), "");
        ledger.record(Outcome::Taken, at(2, 9), "");
        ledger.record(Outcome::Skipped, at(3, 9), "");

        assert_eq!(ledger.last_taken(), Some(at(2, 9)));
        assert_eq!(ledger.latest().unwrap().outcome, Outcome::Skipped);
    }

    #[test]
    fn test_last_taken_follows_insertion_not_timestamp() {
        let mut ledger = OccurrenceLedger::new();
        ledger.record(Outcome::Taken, at(5, 9), "");
        // Backdated correction recorded later
        ledger.record(Outcome::Taken, at(1, 9), "late entry");

        assert_eq!(ledger.last_taken(), Some(at(1, 9)));
        assert_eq!(ledger.history()[1].notes, "late entry");
    }

    #[test]
    fn test_adherence_and_missed_count() {
        let mut ledger = OccurrenceLedger::new();
        ledger.record(Outcome::Taken, at(1, 9), "");
        ledger.record(Outcome::Taken, at(2, 9), "");
        ledger.record(Outcome::Skipped, at(3, 9), "");

        assert_eq!(ledger.missed_count(), 1);
        assert!((ledger.adherence_rate() - 66.666_666).abs() < 0.01);
    }

    #[test]
    fn test_adherence_never_increases_with_skips() {
        let mut ledger = OccurrenceLedger::new();
        ledger.record(Outcome::Taken, at(1, 9), "");

        let mut previous = ledger.adherence_rate();
        for day in 2..10 {
            ledger.record(Outcome::Skipped, at(day, 9), "");
            let rate = ledger.adherence_rate();
            assert!(rate <= previous);
            assert_eq!(rate, ledger.adherence_rate());
            previous = rate;
        }
    }

    #[test]
    fn test_latest_on_stops_at_older_entries() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let mut ledger = OccurrenceLedger::new();
        ledger.record(Outcome::Skipped, at(6, 9), "");
        ledger.record(Outcome::Taken, at(5, 9), "");

        let day6 = NaiveDate::from_ymd_opt(2025, 8, 6).unwrap();
        // Newest entry is older than day 6, so the scan stops there
        assert!(ledger.latest_on(day6, &tz).is_none());
        assert!(ledger.has_occurrence_on(day6, &tz));
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut ledger = OccurrenceLedger::new();
        ledger.record(Outcome::Taken, at(1, 9), "with food");
        ledger.record(Outcome::Skipped, at(2, 9), "");

        let json = serde_json::to_value(&ledger).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["outcome"], "taken");
        assert_eq!(json[0]["timestamp"], "2025-08-01T09:00:00+02:00");

        let restored: OccurrenceLedger = serde_json::from_value(json).unwrap();
        assert_eq!(restored, ledger);
    }
}
