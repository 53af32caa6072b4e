//! Schedule engine: computes the next due instant of a recurrence rule.
//!
//! This module implements the per-frequency rules:
//! - Daily: next future slot today, else the earliest unhandled slot today,
//!   else the first slot tomorrow
//! - Weekly: seven days after the last taken dose, or after the slot a
//!   trailing skip covered
//! - Monthly: same day next month, clamped to the 1st on overflow
//!
//! Every calendar question is answered in the zone of the reference time.

use crate::config::ScheduleConfig;
use crate::types::at_slot;
use crate::{Frequency, OccurrenceLedger, Outcome, RecurrenceRule, TimeOfDay};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone};

/// Compute the next due instant for `rule` given its history.
///
/// Returns `None` for as-needed rules and when month arithmetic runs off the
/// end of the supported calendar.
pub fn compute_next_due<Tz: TimeZone>(
    rule: &RecurrenceRule,
    ledger: &OccurrenceLedger,
    reference: &DateTime<Tz>,
    config: &ScheduleConfig,
) -> Option<DateTime<Tz>> {
    let next_due = match rule.frequency {
        Frequency::AsNeeded => return None,
        Frequency::Daily => Some(daily_next_due(rule, ledger, reference)),
        Frequency::Weekly => Some(weekly_next_due(rule, ledger, reference, config)),
        Frequency::Monthly => monthly_next_due(rule, ledger, reference),
    };

    if let Some(ref due) = next_due {
        tracing::debug!(
            "Computed {} next due {} (reference {})",
            rule.frequency,
            due.naive_local(),
            reference.naive_local()
        );
    }

    next_due
}

fn daily_next_due<Tz: TimeZone>(
    rule: &RecurrenceRule,
    ledger: &OccurrenceLedger,
    reference: &DateTime<Tz>,
) -> DateTime<Tz> {
    let tz = reference.timezone();
    let today = reference.date_naive();

    let slots_today: Vec<DateTime<Tz>> = rule
        .slots()
        .iter()
        .map(|slot| at_slot(&tz, today, *slot))
        .collect();

    if let Some(upcoming) = slots_today.iter().filter(|due| *due > reference).min() {
        return upcoming.clone();
    }

    // A slot counts as handled once anything was recorded for its date, so
    // either every slot today is pending or none is.
    if !ledger.has_occurrence_on(today, &tz) {
        if let Some(pending) = slots_today.into_iter().min() {
            return pending;
        }
    }

    let tomorrow = today.succ_opt().unwrap_or(today);
    at_slot(&tz, tomorrow, rule.earliest_slot())
}

fn weekly_next_due<Tz: TimeZone>(
    rule: &RecurrenceRule,
    ledger: &OccurrenceLedger,
    reference: &DateTime<Tz>,
    config: &ScheduleConfig,
) -> DateTime<Tz> {
    let tz = reference.timezone();
    let slot = rule.primary_slot();

    // A trailing skip covers the pending slot, or a later weekly slot the
    // skip reached within tolerance, and the schedule rolls from there.
    if let Some(latest) = ledger.latest() {
        if latest.outcome == Outcome::Skipped {
            let skipped_at = latest.timestamp.with_timezone(&tz);
            let pending = match ledger.last_taken() {
                Some(taken) => taken.with_timezone(&tz).date_naive() + Duration::weeks(1),
                None => first_dose_date(rule, &tz, &skipped_at),
            };
            let cutoff = skipped_at + config.skip_match_tolerance();
            let skipped_on = covered_slot_date(&tz, pending, slot, &cutoff);
            return at_slot(&tz, skipped_on + Duration::weeks(1), slot);
        }
    }

    if let Some(last_taken) = ledger.last_taken() {
        let taken_on = last_taken.with_timezone(&tz).date_naive();
        return at_slot(&tz, taken_on + Duration::weeks(1), slot);
    }

    let start = first_dose_date(rule, &tz, reference);
    let first = at_slot(&tz, start, slot);
    if first <= *reference {
        at_slot(&tz, start + Duration::weeks(1), slot)
    } else {
        first
    }
}

/// Start date of the first weekly dose: the active-from day, else `reference`'s day.
fn first_dose_date<Tz: TimeZone>(rule: &RecurrenceRule, tz: &Tz, reference: &DateTime<Tz>) -> NaiveDate {
    rule.active_from
        .as_ref()
        .map(|bound| bound.date_in(tz))
        .unwrap_or_else(|| reference.date_naive())
}

/// Latest weekly slot date, starting at `pending`, whose slot is not after `cutoff`.
/// Returns `pending` itself when even that slot lies ahead.
fn covered_slot_date<Tz: TimeZone>(
    tz: &Tz,
    pending: NaiveDate,
    slot: TimeOfDay,
    cutoff: &DateTime<Tz>,
) -> NaiveDate {
    let mut covered = pending;
    while at_slot(tz, covered + Duration::weeks(1), slot) <= *cutoff {
        covered = covered + Duration::weeks(1);
    }
    covered
}

fn monthly_next_due<Tz: TimeZone>(
    rule: &RecurrenceRule,
    ledger: &OccurrenceLedger,
    reference: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let tz = reference.timezone();
    let last_taken = ledger.last_taken().map(|t| t.with_timezone(&tz));
    let latest_skip = ledger
        .latest()
        .filter(|o| o.outcome == Outcome::Skipped)
        .map(|o| o.timestamp.with_timezone(&tz));

    match (latest_skip, last_taken) {
        // Skip after a taken dose: roll from the skip's month, keeping the
        // taken dose's time of day.
        (Some(skipped_at), Some(taken_at)) => {
            let skipped_on = skipped_at.date_naive();
            match same_day_next_month(skipped_on) {
                Some(date) => Some(at_slot_time(&tz, date, taken_at.time())),
                None => first_of_next_month(skipped_on)
                    .map(|date| at_slot(&tz, date, TimeOfDay::DEFAULT)),
            }
        }
        // Skips only: advance from the skip rather than re-anchoring on the
        // reference, so the skipped month reads as skipped.
        (Some(skipped_at), None) => {
            let skipped_on = skipped_at.date_naive();
            same_day_next_month(skipped_on)
                .or_else(|| first_of_next_month(skipped_on))
                .map(|date| at_slot(&tz, date, rule.primary_slot()))
        }
        (None, Some(taken_at)) => {
            let taken_on = taken_at.date_naive();
            same_day_next_month(taken_on)
                .or_else(|| first_of_next_month(taken_on))
                .map(|date| at_slot_time(&tz, date, taken_at.time()))
        }
        // First dose anchors on the reference itself
        (None, None) => Some(reference.clone()),
    }
}

fn at_slot_time<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: chrono::NaiveTime) -> DateTime<Tz> {
    crate::types::localize(tz, date.and_time(time))
}

/// First day of the month after `date`.
pub fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)?.checked_add_months(Months::new(1))
}

/// Same day-of-month in the month after `date`, or `None` when that month is
/// too short.
pub fn same_day_next_month(date: NaiveDate) -> Option<NaiveDate> {
    first_of_next_month(date)?.with_day(date.day())
}
