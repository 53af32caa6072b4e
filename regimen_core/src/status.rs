//! Status resolver: classifies a scheduled item at a point in time.
//!
//! Rules are checked in a fixed order and the first match wins:
//! 1. Outside the active range → not due
//! 2. As-needed → not due
//! 3. (next due is computed if the cache is empty)
//! 4. Skip recorded for the current period → skipped
//! 5. At or past next due → due, overdue after the grace window
//! 6. Taken within the current period → taken
//! 7. Otherwise → not due
//!
//! Every evaluation that changes the status produces a [`StatusChange`]
//! for the caller to deliver.

use crate::config::ScheduleConfig;
use crate::schedule::compute_next_due;
use crate::{Frequency, ItemLabel, OccurrenceLedger, Outcome, RecurrenceRule, ScheduledItemState, Status};
use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use serde_json::{Map, Value};

/// Event name carried by every status-change notification
pub const STATUS_CHANGED_EVENT: &str = "regimen_status_changed";

/// Grace window after next-due before a dose counts as overdue
pub fn overdue_grace() -> Duration {
    Duration::hours(2)
}

/// Result of evaluating one item
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub status: Status,
    pub change: Option<StatusChange>,
}

/// Notification emitted when an item's status changes
#[derive(Clone, Debug, PartialEq)]
pub struct StatusChange {
    pub item_id: String,
    pub label: ItemLabel,
    pub frequency: Frequency,
    pub old_status: Status,
    pub new_status: Status,
    pub next_due: Option<DateTime<FixedOffset>>,
    pub last_taken: Option<DateTime<FixedOffset>>,
    pub missed_count: usize,
    pub adherence_rate: f64,
}

impl StatusChange {
    pub fn event_name(&self) -> &'static str {
        STATUS_CHANGED_EVENT
    }

    /// Flat string-to-primitive mapping for host delivery.
    ///
    /// `next_due` and `last_taken` are omitted when unknown.
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("item_id".into(), Value::from(self.item_id.clone()));
        payload.insert("name".into(), Value::from(self.label.name.clone()));
        payload.insert("dosage".into(), Value::from(self.label.dosage.clone()));
        payload.insert("frequency".into(), Value::from(self.frequency.as_str()));
        payload.insert("old_status".into(), Value::from(self.old_status.as_str()));
        payload.insert("new_status".into(), Value::from(self.new_status.as_str()));
        if let Some(next_due) = self.next_due {
            payload.insert("next_due".into(), Value::from(next_due.to_rfc3339()));
        }
        if let Some(last_taken) = self.last_taken {
            payload.insert("last_taken".into(), Value::from(last_taken.to_rfc3339()));
        }
        payload.insert("missed_count".into(), Value::from(self.missed_count));
        payload.insert("adherence_rate".into(), Value::from(self.adherence_rate));
        payload
    }
}

/// Evaluate `item` at `now`, updating its cached next-due and status.
pub fn evaluate<Tz: TimeZone>(
    item: &mut ScheduledItemState,
    now: &DateTime<Tz>,
    config: &ScheduleConfig,
) -> Evaluation {
    let old_status = item.current_status();
    let new_status = resolve(item, now, config);
    item.set_status(new_status);

    let change = (old_status != new_status).then(|| {
        tracing::info!(
            "Item {} changed status: {} -> {}",
            item.id(),
            old_status,
            new_status
        );
        StatusChange {
            item_id: item.id().to_string(),
            label: item.label().clone(),
            frequency: item.rule().frequency,
            old_status,
            new_status,
            next_due: item.next_due(),
            last_taken: item.ledger().last_taken(),
            missed_count: item.ledger().missed_count(),
            adherence_rate: item.ledger().adherence_rate(),
        }
    });

    Evaluation {
        status: new_status,
        change,
    }
}

fn resolve<Tz: TimeZone>(
    item: &mut ScheduledItemState,
    now: &DateTime<Tz>,
    config: &ScheduleConfig,
) -> Status {
    if !item.rule().is_active_at(now) {
        return Status::NotDue;
    }

    if item.rule().frequency == Frequency::AsNeeded {
        return Status::NotDue;
    }

    let tz = now.timezone();
    let next_due = match item.next_due() {
        Some(cached) => cached.with_timezone(&tz),
        None => match compute_next_due(item.rule(), item.ledger(), now, config) {
            Some(computed) => {
                item.set_next_due(computed.fixed_offset());
                computed
            }
            None => return Status::NotDue,
        },
    };

    if skipped_this_period(item.rule(), item.ledger(), now, &next_due) {
        return Status::Skipped;
    }

    if *now >= next_due {
        if *now > next_due + overdue_grace() {
            return Status::Overdue;
        }
        return Status::Due;
    }

    if taken_this_period(item.rule(), item.ledger(), now) {
        return Status::Taken;
    }

    Status::NotDue
}

/// Daily: the latest entry for today is a skip. Otherwise: the latest entry
/// overall is a skip and the next slot has not arrived.
fn skipped_this_period<Tz: TimeZone>(
    rule: &RecurrenceRule,
    ledger: &OccurrenceLedger,
    now: &DateTime<Tz>,
    next_due: &DateTime<Tz>,
) -> bool {
    match rule.frequency {
        Frequency::Daily => ledger
            .latest_on(now.date_naive(), &now.timezone())
            .is_some_and(|o| o.outcome == Outcome::Skipped),
        Frequency::Weekly | Frequency::Monthly => {
            ledger
                .latest()
                .is_some_and(|o| o.outcome == Outcome::Skipped)
                && now < next_due
        }
        Frequency::AsNeeded => false,
    }
}

/// Daily: last taken dose is on today's date. Otherwise: last taken dose is
/// less than one dose interval ago.
fn taken_this_period<Tz: TimeZone>(
    rule: &RecurrenceRule,
    ledger: &OccurrenceLedger,
    now: &DateTime<Tz>,
) -> bool {
    let Some(last_taken) = ledger.last_taken() else {
        return false;
    };
    let last_taken = last_taken.with_timezone(&now.timezone());

    match rule.frequency {
        Frequency::Daily => last_taken.date_naive() == now.date_naive(),
        Frequency::Weekly | Frequency::Monthly => rule
            .frequency
            .dose_interval()
            .is_some_and(|interval| now.clone().signed_duration_since(&last_taken) < interval),
        Frequency::AsNeeded => false,
    }
}
