#![forbid(unsafe_code)]

//! Core scheduling model for the Regimen medication tracker.
//!
//! This crate provides:
//! - Domain types (frequencies, slots, recurrence rules, occurrences)
//! - The occurrence ledger and its aggregates
//! - The schedule engine (next-due computation)
//! - The status resolver and change notifications
//! - A registry facade, history calendar and CSV export

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod ledger;
pub mod schedule;
pub mod status;
pub mod item;
pub mod registry;
pub mod report;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::{Config, ScheduleConfig};
pub use ledger::OccurrenceLedger;
pub use schedule::compute_next_due;
pub use status::{Evaluation, StatusChange, STATUS_CHANGED_EVENT};
pub use item::{ItemRecord, ScheduledItemState};
pub use registry::{LoadFailure, LoadOutcome, Registry};
pub use report::{write_history_csv, HistoryEntry};
