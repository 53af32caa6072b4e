//! Core domain types for the regimen scheduler.
//!
//! This module defines the fundamental values the engine works with:
//! - Frequencies, outcomes and status classifications
//! - Time-of-day slots and active-range bounds
//! - Recurrence rules and recorded occurrences
//! - Zone-aware instant parsing shared by every record boundary

use crate::{Error, Result};
use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, Local, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Frequency, Outcome, Status
// ============================================================================

/// How often a rule schedules an occurrence
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    AsNeeded,
}

impl Frequency {
    /// Length of one scheduling period, used for "recently taken" checks.
    ///
    /// `AsNeeded` has no period.
    pub fn dose_interval(self) -> Option<Duration> {
        match self {
            Frequency::Daily => Some(Duration::days(1)),
            Frequency::Weekly => Some(Duration::weeks(1)),
            Frequency::Monthly => Some(Duration::days(30)),
            Frequency::AsNeeded => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::AsNeeded => "as_needed",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "as_needed" | "as-needed" | "asneeded" => Ok(Frequency::AsNeeded),
            other => Err(Error::Other(format!("Unknown frequency: {}", other))),
        }
    }
}

/// What happened to a scheduled dose
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Taken,
    Skipped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Taken => "taken",
            Outcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current classification of a scheduled item
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    NotDue,
    Due,
    Overdue,
    Taken,
    Skipped,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::NotDue => "not_due",
            Status::Due => "due",
            Status::Overdue => "overdue",
            Status::Taken => "taken",
            Status::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Time-of-day slots
// ============================================================================

/// A wall-clock slot in 24-hour `HH:MM` form
///
/// Only valid hours and minutes can be constructed, so projecting a slot
/// onto a date never fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// Slot used when a scheduled rule lists no times.
    pub const DEFAULT: TimeOfDay = TimeOfDay { hour: 9, minute: 0 };

    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(Error::InvalidTimeOfDay(format!("{}:{}", hour, minute)));
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn hour(self) -> u32 {
        self.hour.into()
    }

    pub fn minute(self) -> u32 {
        self.minute.into()
    }

    pub fn as_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTimeOfDay(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;

        let digits = |part: &str, max_len: usize| {
            !part.is_empty() && part.len() <= max_len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(hour, 2) || minute.len() != 2 || !digits(minute, 2) {
            return Err(invalid());
        }

        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        TimeOfDay::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// ============================================================================
// Instants and zones
// ============================================================================

/// Interpret a wall-clock value in `tz`.
///
/// Ambiguous times (clocks going back) resolve to the earlier instant; times
/// inside a gap (clocks going forward) resolve to one hour later.
pub fn localize<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    }
}

/// Project a slot onto a calendar date in `tz`.
pub fn at_slot<Tz: TimeZone>(tz: &Tz, date: NaiveDate, slot: TimeOfDay) -> DateTime<Tz> {
    localize(tz, date.and_time(slot.as_naive()))
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 instant.
///
/// Values without an offset are interpreted in the process's local zone.
pub fn parse_instant(s: &str) -> Result<DateTime<FixedOffset>> {
    let trimmed = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M%:z") {
        return Ok(dt);
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(localize(&Local, naive).fixed_offset());
        }
    }

    Err(Error::InvalidInstant(s.to_string()))
}

/// Serde adapter writing RFC 3339 and reading through [`parse_instant`]
pub(crate) mod instant_format {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<FixedOffset>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DateTime<FixedOffset>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_instant(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Active range bounds
// ============================================================================

/// One end of a rule's active range (inclusive)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActiveBound {
    /// Whole-day bound compared against the local calendar date
    Date(NaiveDate),
    /// Exact bound compared against the instant itself
    Instant(DateTime<FixedOffset>),
}

impl ActiveBound {
    /// Calendar date of this bound as seen from `tz`.
    pub fn date_in<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        match self {
            ActiveBound::Date(date) => *date,
            ActiveBound::Instant(instant) => instant.with_timezone(tz).date_naive(),
        }
    }

    /// True when `now` falls before this bound used as a start.
    pub fn starts_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        match self {
            ActiveBound::Date(date) => now.date_naive() < *date,
            ActiveBound::Instant(instant) => now.naive_utc() < instant.naive_utc(),
        }
    }

    /// True when `now` falls after this bound used as an end.
    pub fn ends_before<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        match self {
            ActiveBound::Date(date) => now.date_naive() > *date,
            ActiveBound::Instant(instant) => now.naive_utc() > instant.naive_utc(),
        }
    }
}

impl FromStr for ActiveBound {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(ActiveBound::Date(date));
        }
        parse_instant(trimmed)
            .map(ActiveBound::Instant)
            .map_err(|_| Error::InvalidBound(s.to_string()))
    }
}

impl TryFrom<String> for ActiveBound {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ActiveBound> for String {
    fn from(value: ActiveBound) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ActiveBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveBound::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            ActiveBound::Instant(instant) => f.write_str(&instant.to_rfc3339()),
        }
    }
}

// ============================================================================
// Recurrence rule
// ============================================================================

const DEFAULT_SLOTS: [TimeOfDay; 1] = [TimeOfDay::DEFAULT];

/// A repeating-event definition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default, alias = "times")]
    pub times_of_day: Vec<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_from: Option<ActiveBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_until: Option<ActiveBound>,
}

impl RecurrenceRule {
    /// Build a rule from textual `HH:MM` slots.
    ///
    /// Any malformed slot fails the whole rule.
    pub fn new<I, S>(frequency: Frequency, times: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let times_of_day = times
            .into_iter()
            .map(|t| t.as_ref().parse())
            .collect::<Result<Vec<TimeOfDay>>>()?;

        Ok(Self {
            frequency,
            times_of_day,
            active_from: None,
            active_until: None,
        })
    }

    pub fn with_active_from(mut self, bound: ActiveBound) -> Self {
        self.active_from = Some(bound);
        self
    }

    pub fn with_active_until(mut self, bound: ActiveBound) -> Self {
        self.active_until = Some(bound);
        self
    }

    /// Configured slots, or the single 09:00 default when none are listed.
    pub fn slots(&self) -> &[TimeOfDay] {
        if self.times_of_day.is_empty() {
            &DEFAULT_SLOTS
        } else {
            &self.times_of_day
        }
    }

    /// First listed slot; anchors weekly and monthly schedules.
    pub fn primary_slot(&self) -> TimeOfDay {
        self.slots()[0]
    }

    pub fn earliest_slot(&self) -> TimeOfDay {
        self.slots().iter().copied().min().unwrap_or(TimeOfDay::DEFAULT)
    }

    /// Whether `now` falls inside the inclusive active range.
    pub fn is_active_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        if let Some(from) = &self.active_from {
            if from.starts_after(now) {
                return false;
            }
        }
        if let Some(until) = &self.active_until {
            if until.ends_before(now) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Occurrences and labels
// ============================================================================

/// A recorded dose, taken or skipped
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(with = "instant_format")]
    pub timestamp: DateTime<FixedOffset>,
    pub outcome: Outcome,
    #[serde(default)]
    pub notes: String,
}

impl Occurrence {
    pub fn new(outcome: Outcome, timestamp: DateTime<FixedOffset>, notes: impl Into<String>) -> Self {
        Self {
            timestamp,
            outcome,
            notes: notes.into(),
        }
    }

    pub fn is_taken(&self) -> bool {
        self.outcome == Outcome::Taken
    }

    /// Calendar date of this occurrence as seen from `tz`.
    pub fn date_in<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        self.timestamp.with_timezone(tz).date_naive()
    }
}

/// Human-facing description of a tracked item
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLabel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub notes: String,
}

impl ItemLabel {
    pub fn new(name: impl Into<String>, dosage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dosage: dosage.into(),
            notes: String::new(),
        }
    }
}
