//! Error types for the medtrack_core library.

use crate::eligibility::Constraint;
use crate::types::{DoseId, MedicationId};
use chrono::NaiveDateTime;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for medtrack_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller violated an input contract (zero cap, unsorted history, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// User-supplied timestamp could not be parsed
    #[error("Invalid date/time format: {0:?} (expected YYYY-MM-DDTHH:MM)")]
    InvalidTimestamp(String),

    /// No medication with this id
    #[error("Medication {0} not found")]
    MedicationNotFound(MedicationId),

    /// No dose with this id
    #[error("Dose {0} not found")]
    DoseNotFound(DoseId),

    /// The write-path gate refused a new dose
    #[error("{}: {medication} may be taken again at {next_allowed}", .constraint.refusal())]
    DoseNotAllowed {
        medication: String,
        next_allowed: NaiveDateTime,
        constraint: Constraint,
    },

    /// Journal could not be replayed consistently
    #[error("Journal error: {0}")]
    Journal(String),
}
