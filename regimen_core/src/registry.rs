//! Registry of tracked items.
//!
//! The registry is the host-facing facade: it loads plain records, applies
//! mutations, and evaluates every item in one pass. Status changes come back
//! as [`StatusChange`] values for the host to deliver.

use crate::config::ScheduleConfig;
use crate::item::{ItemRecord, ScheduledItemState};
use crate::report::{self, HistoryEntry};
use crate::status::{Evaluation, StatusChange};
use crate::{Error, ItemLabel, Outcome, RecurrenceRule, Result};
use chrono::{DateTime, FixedOffset, TimeZone};
use serde_json::Value;
use uuid::Uuid;

/// A stored record that could not be turned into an item
#[derive(Debug)]
pub struct LoadFailure {
    pub id: Option<String>,
    pub error: Error,
    /// The record as supplied, so the host can keep it untouched
    pub raw: Value,
}

/// Result of [`Registry::load`]
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub registry: Registry,
    pub failures: Vec<LoadFailure>,
}

#[derive(Clone, Debug, Default)]
pub struct Registry {
    items: Vec<ScheduledItemState>,
    config: ScheduleConfig,
}

impl Registry {
    pub fn new(config: ScheduleConfig) -> Self {
        Self {
            items: Vec::new(),
            config,
        }
    }

    /// Rebuild items from stored records.
    ///
    /// Each malformed record is reported on its own; the rest still load.
    pub fn load(records: Vec<Value>, config: ScheduleConfig) -> LoadOutcome {
        let mut registry = Registry::new(config);
        let mut failures = Vec::new();

        for raw in records {
            let id = raw.get("id").and_then(Value::as_str).map(str::to_string);

            let parsed = ItemRecord::from_value(raw.clone()).and_then(|record| {
                if registry.get(&record.id).is_some() {
                    Err(Error::InvalidRecord {
                        id: record.id,
                        reason: "duplicate id".into(),
                    })
                } else {
                    Ok(record)
                }
            });

            match parsed {
                Ok(record) => registry.items.push(ScheduledItemState::from_record(record)),
                Err(error) => {
                    tracing::warn!("Skipping stored record: {}", error);
                    failures.push(LoadFailure { id, error, raw });
                }
            }
        }

        tracing::info!(
            "Loaded {} items ({} rejected)",
            registry.items.len(),
            failures.len()
        );
        LoadOutcome { registry, failures }
    }

    pub fn to_records(&self) -> Vec<ItemRecord> {
        self.items.iter().map(ScheduledItemState::to_record).collect()
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledItemState> {
        self.items.iter()
    }

    pub fn get(&self, id: &str) -> Option<&ScheduledItemState> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Find an item by exact id, then by case-insensitive name.
    pub fn resolve(&self, key: &str) -> Result<&ScheduledItemState> {
        self.position(key)
            .map(|index| &self.items[index])
            .ok_or_else(|| Error::UnknownItem(key.to_string()))
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.id() == key)
            .or_else(|| {
                let wanted = key.to_lowercase();
                self.items
                    .iter()
                    .position(|item| item.label().name.to_lowercase() == wanted)
            })
    }

    fn item_mut(&mut self, key: &str) -> Result<&mut ScheduledItemState> {
        let index = self
            .position(key)
            .ok_or_else(|| Error::UnknownItem(key.to_string()))?;
        Ok(&mut self.items[index])
    }

    /// Start tracking a new item and return its id.
    pub fn add(&mut self, label: ItemLabel, rule: RecurrenceRule) -> String {
        let id = Uuid::new_v4().simple().to_string();
        tracing::info!("Added {} ({}) as {}", label.name, rule.frequency, id);
        self.items.push(ScheduledItemState::new(id.clone(), label, rule));
        id
    }

    pub fn remove(&mut self, key: &str) -> Result<ScheduledItemState> {
        let index = self
            .position(key)
            .ok_or_else(|| Error::UnknownItem(key.to_string()))?;
        let removed = self.items.remove(index);
        tracing::info!("Removed {}", removed.id());
        Ok(removed)
    }

    /// Replace an item's label and rule, keeping its history.
    pub fn update(&mut self, key: &str, label: ItemLabel, rule: RecurrenceRule) -> Result<()> {
        let item = self.item_mut(key)?;
        item.redefine(label, rule);
        tracing::info!("Updated {}", item.id());
        Ok(())
    }

    pub fn take<Tz: TimeZone>(
        &mut self,
        key: &str,
        at: &DateTime<Tz>,
        notes: &str,
    ) -> Result<Evaluation> {
        self.record(key, Outcome::Taken, at, notes)
    }

    pub fn skip<Tz: TimeZone>(
        &mut self,
        key: &str,
        at: &DateTime<Tz>,
        notes: &str,
    ) -> Result<Evaluation> {
        self.record(key, Outcome::Skipped, at, notes)
    }

    /// Record an occurrence at `at`, then evaluate the item at that instant.
    pub fn record<Tz: TimeZone>(
        &mut self,
        key: &str,
        outcome: Outcome,
        at: &DateTime<Tz>,
        notes: &str,
    ) -> Result<Evaluation> {
        let config = self.config.clone();
        let item = self.item_mut(key)?;
        item.record(outcome, at.clone(), notes);
        tracing::info!("Recorded {} for {}", outcome, item.id());
        Ok(item.evaluate(at, &config))
    }

    /// Evaluate every item at `now`, returning the changes in item order.
    pub fn evaluate_all<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Vec<StatusChange> {
        let config = &self.config;
        self.items
            .iter_mut()
            .filter_map(|item| item.evaluate(now, config).change)
            .collect()
    }

    /// Calendar entries for every occurrence in `[start, end]`.
    pub fn history(
        &self,
        start: &DateTime<FixedOffset>,
        end: &DateTime<FixedOffset>,
    ) -> Vec<HistoryEntry> {
        report::history_entries(&self.items, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Frequency, Status};
    use serde_json::json;

    fn at(d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 8, d, h, min, 0)
            .unwrap()
    }

    fn daily(times: &[&str]) -> RecurrenceRule {
        RecurrenceRule::new(Frequency::Daily, times.iter().copied()).unwrap()
    }

    #[test]
    fn test_add_and_resolve_by_name() {
        let mut registry = Registry::default();
        let id = registry.add(ItemLabel::new("Metformin", "500mg"), daily(&["08:00"]));

        assert_eq!(id.len(), 32);
        assert_eq!(registry.resolve("metformin").unwrap().id(), id);
        assert_eq!(registry.resolve(&id).unwrap().label().name, "Metformin");
        assert!(matches!(
            registry.resolve("aspirin"),
            Err(Error::UnknownItem(_))
        ));
    }

    #[test]
    fn test_take_evaluates_at_record_time() {
        let mut registry = Registry::default();
        registry.add(ItemLabel::new("Metformin", "500mg"), daily(&["08:00", "20:00"]));

        let evaluation = registry.take("Metformin", &at(7, 8, 10), "").unwrap();
        assert_eq!(evaluation.status, Status::Taken);

        let change = evaluation.change.unwrap();
        assert_eq!(change.old_status, Status::NotDue);
        assert_eq!(change.new_status, Status::Taken);
        assert_eq!(change.last_taken, Some(at(7, 8, 10)));
    }

    #[test]
    fn test_evaluate_all_reports_only_changes() {
        let mut registry = Registry::default();
        registry.add(ItemLabel::new("Morning", "1"), daily(&["08:00"]));
        registry.add(ItemLabel::new("Evening", "1"), daily(&["20:00"]));

        let changes = registry.evaluate_all(&at(7, 9, 0));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].label.name, "Morning");
        assert_eq!(changes[0].new_status, Status::Due);

        assert!(registry.evaluate_all(&at(7, 9, 30)).is_empty());

        let later = registry.evaluate_all(&at(7, 20, 5));
        let names: Vec<&str> = later.iter().map(|c| c.label.name.as_str()).collect();
        assert_eq!(names, vec!["Morning", "Evening"]);
        assert_eq!(later[0].new_status, Status::Overdue);
    }

    #[test]
    fn test_update_keeps_history() {
        let mut registry = Registry::default();
        let id = registry.add(ItemLabel::new("Iron", "65mg"), daily(&["09:00"]));
        registry.take(&id, &at(6, 9, 0), "").unwrap();

        let weekly = RecurrenceRule::new(Frequency::Weekly, ["09:00"]).unwrap();
        registry
            .update(&id, ItemLabel::new("Iron", "130mg"), weekly)
            .unwrap();

        let item = registry.get(&id).unwrap();
        assert_eq!(item.ledger().len(), 1);
        assert_eq!(item.next_due(), None);
        assert_eq!(item.rule().frequency, Frequency::Weekly);
    }

    #[test]
    fn test_remove() {
        let mut registry = Registry::default();
        let id = registry.add(ItemLabel::new("Iron", "65mg"), daily(&["09:00"]));

        let removed = registry.remove("IRON").unwrap();
        assert_eq!(removed.id(), id);
        assert!(registry.is_empty());
        assert!(matches!(registry.remove(&id), Err(Error::UnknownItem(_))));
    }

    #[test]
    fn test_load_isolates_bad_records() {
        let records = vec![
            json!({
                "id": "good",
                "name": "Metformin",
                "dosage": "500mg",
                "rule": { "frequency": "daily", "times_of_day": ["08:00"] },
                "history": [{ "timestamp": "2025-08-06T08:00:00+02:00", "outcome": "taken" }]
            }),
            json!({
                "id": "bad_time",
                "name": "Broken",
                "rule": { "frequency": "daily", "times_of_day": ["8 o'clock"] }
            }),
            json!({ "name": "No id" }),
            json!({
                "id": "good",
                "name": "Duplicate",
                "rule": { "frequency": "weekly" }
            }),
        ];

        let outcome = Registry::load(records, ScheduleConfig::default());
        assert_eq!(outcome.registry.len(), 1);
        assert_eq!(outcome.failures.len(), 3);

        let failed_ids: Vec<Option<&str>> =
            outcome.failures.iter().map(|f| f.id.as_deref()).collect();
        assert_eq!(failed_ids, vec![Some("bad_time"), None, Some("good")]);
        assert_eq!(outcome.failures[0].raw["name"], "Broken");

        let item = outcome.registry.get("good").unwrap();
        assert_eq!(item.current_status(), Status::NotDue);
        assert_eq!(item.ledger().len(), 1);
    }

    #[test]
    fn test_records_roundtrip_through_load() {
        let mut registry = Registry::default();
        let id = registry.add(ItemLabel::new("Vitamin D", "1000 IU"), daily(&["10:00"]));
        registry.take(&id, &at(6, 10, 0), "").unwrap();
        registry.skip(&id, &at(7, 10, 0), "travelling").unwrap();

        let values: Vec<Value> = registry
            .to_records()
            .iter()
            .map(|r| r.to_value().unwrap())
            .collect();
        let mut reloaded = Registry::load(values, ScheduleConfig::default()).registry;

        assert_eq!(reloaded.to_records(), registry.to_records());

        let now = at(7, 12, 0);
        let original = registry.evaluate_all(&now);
        let fresh = reloaded.evaluate_all(&now);
        assert_eq!(registry.get(&id).unwrap().current_status(), Status::Skipped);
        assert_eq!(reloaded.get(&id).unwrap().current_status(), Status::Skipped);
        assert!(original.is_empty());
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn test_history_across_items() {
        let mut registry = Registry::default();
        let a = registry.add(ItemLabel::new("A", "1"), daily(&["08:00"]));
        let b = registry.add(ItemLabel::new("B", "2"), daily(&["09:00"]));
        registry.take(&b, &at(5, 9, 0), "").unwrap();
        registry.take(&a, &at(6, 8, 0), "").unwrap();
        registry.skip(&a, &at(4, 8, 0), "").unwrap();

        let entries = registry.history(&at(1, 0, 0), &at(31, 23, 59));
        let summaries: Vec<&str> = entries.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Skipped: A (1)", "Taken: B (2)", "Taken: A (1)"]);
    }
}
