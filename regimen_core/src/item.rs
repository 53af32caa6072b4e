//! Per-item scheduling state and its plain record form.

use crate::config::ScheduleConfig;
use crate::status::{self, Evaluation};
use crate::{Error, ItemLabel, Occurrence, OccurrenceLedger, Outcome, RecurrenceRule, Result, Status};
use chrono::{DateTime, FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};

/// One tracked item: its rule, its ledger and the derived schedule state.
///
/// Next-due and status are never persisted. A freshly loaded item starts as
/// not due with an empty cache and is brought up to date by [`Self::evaluate`].
#[derive(Clone, Debug)]
pub struct ScheduledItemState {
    id: String,
    label: ItemLabel,
    rule: RecurrenceRule,
    ledger: OccurrenceLedger,
    cached_next_due: Option<DateTime<FixedOffset>>,
    current_status: Status,
}

impl ScheduledItemState {
    pub fn new(id: impl Into<String>, label: ItemLabel, rule: RecurrenceRule) -> Self {
        Self {
            id: id.into(),
            label,
            rule,
            ledger: OccurrenceLedger::new(),
            cached_next_due: None,
            current_status: Status::NotDue,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &ItemLabel {
        &self.label
    }

    pub fn rule(&self) -> &RecurrenceRule {
        &self.rule
    }

    pub fn ledger(&self) -> &OccurrenceLedger {
        &self.ledger
    }

    /// Cached next-due instant, if one has been computed since the last record.
    pub fn next_due(&self) -> Option<DateTime<FixedOffset>> {
        self.cached_next_due
    }

    pub fn current_status(&self) -> Status {
        self.current_status
    }

    /// Append an occurrence and drop the cached next-due.
    pub fn record<Tz: TimeZone>(
        &mut self,
        outcome: Outcome,
        timestamp: DateTime<Tz>,
        notes: impl Into<String>,
    ) -> &Occurrence {
        self.cached_next_due = None;
        tracing::debug!("Invalidated next due for {}", self.id);
        self.ledger.record(outcome, timestamp.fixed_offset(), notes)
    }

    pub fn take<Tz: TimeZone>(&mut self, at: DateTime<Tz>, notes: impl Into<String>) -> &Occurrence {
        self.record(Outcome::Taken, at, notes)
    }

    pub fn skip<Tz: TimeZone>(&mut self, at: DateTime<Tz>, notes: impl Into<String>) -> &Occurrence {
        self.record(Outcome::Skipped, at, notes)
    }

    /// Replace the item's definition. The ledger is kept and the schedule
    /// is recomputed on the next evaluation.
    pub fn redefine(&mut self, label: ItemLabel, rule: RecurrenceRule) {
        self.label = label;
        self.rule = rule;
        self.reset_schedule();
    }

    pub fn reset_schedule(&mut self) {
        self.cached_next_due = None;
    }

    /// Classify the item at `now`; see [`crate::status`].
    pub fn evaluate<Tz: TimeZone>(&mut self, now: &DateTime<Tz>, config: &ScheduleConfig) -> Evaluation {
        status::evaluate(self, now, config)
    }

    pub(crate) fn set_next_due(&mut self, next_due: DateTime<FixedOffset>) {
        self.cached_next_due = Some(next_due);
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.current_status = status;
    }

    /// Rebuild an item from its record with fresh derived state.
    pub fn from_record(record: ItemRecord) -> Self {
        Self {
            id: record.id,
            label: record.label,
            rule: record.rule,
            ledger: OccurrenceLedger::from_history(record.history),
            cached_next_due: None,
            current_status: Status::NotDue,
        }
    }

    pub fn to_record(&self) -> ItemRecord {
        ItemRecord {
            id: self.id.clone(),
            label: self.label.clone(),
            rule: self.rule.clone(),
            history: self.ledger.history().to_vec(),
        }
    }
}

/// Plain key-value form of an item, as stored by the host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    #[serde(flatten)]
    pub label: ItemLabel,
    pub rule: RecurrenceRule,
    #[serde(default)]
    pub history: Vec<Occurrence>,
}

impl ItemRecord {
    /// Decode one stored record.
    ///
    /// Failures name the record's id when it can be read.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let id = value
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or("<unknown>")
            .to_string();

        serde_json::from_value(value).map_err(|e| Error::InvalidRecord {
            id,
            reason: e.to_string(),
        })
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
