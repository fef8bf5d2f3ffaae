#![forbid(unsafe_code)]

//! Core domain model and business logic for the medication tracker.
//!
//! This crate provides:
//! - Domain types (medications, doses, dosing policy)
//! - The dose eligibility calculator
//! - Next-dose display bucketing
//! - Persistence (journal, ledger replay, CSV export)
//! - The tracker service used by the CLI

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod eligibility;
pub mod display;
pub mod journal;
pub mod ledger;
pub mod csv_export;
pub mod tracker;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use eligibility::{checked_next_allowed, evaluate, next_allowed, Constraint, Eligibility};
pub use display::NextDoseDisplay;
pub use journal::{CompactionReport, Journal, JournalEntry};
pub use ledger::{Ledger, MedicationStatus};
pub use csv_export::export_csv;
pub use tracker::{MedicationHistory, Tracker};
