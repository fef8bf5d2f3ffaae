//! Core domain types for the medication tracker.
//!
//! This module defines the fundamental types used throughout the system:
//! - Medication and dose identities
//! - Dosing policy (minimum interval, daily cap)
//! - Recorded dose events
//!
//! All timestamps are naive UTC (`NaiveDateTime`); no timezone is stored.

use crate::{Error, Result};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identity Types
// ============================================================================

/// Identity of a medication in the journal
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct MedicationId(pub u32);

/// Identity of a recorded dose in the journal
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct DoseId(pub u32);

impl fmt::Display for MedicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for DoseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for MedicationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_id(s).map(MedicationId)
    }
}

impl FromStr for DoseId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_id(s).map(DoseId)
    }
}

fn parse_id(s: &str) -> Result<u32> {
    s.trim()
        .trim_start_matches('#')
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("not a valid id: {:?}", s)))
}

// ============================================================================
// Policy
// ============================================================================

/// Dosing constraints attached to a medication
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DosePolicy {
    /// Minimum hours between two consecutive doses
    pub min_interval_hours: u32,
    /// Maximum doses inside any rolling 24-hour window
    pub max_doses_per_day: u32,
}

impl DosePolicy {
    /// Build a validated policy. A zero daily cap is rejected.
    pub fn new(min_interval_hours: u32, max_doses_per_day: u32) -> Result<Self> {
        let policy = Self {
            min_interval_hours,
            max_doses_per_day,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check the policy bounds
    pub fn validate(&self) -> Result<()> {
        if self.max_doses_per_day == 0 {
            return Err(Error::InvalidArgument(
                "max doses per day must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Records
// ============================================================================

/// A tracked medication
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Medication {
    pub id: MedicationId,
    pub name: String,
    pub policy: DosePolicy,
}

/// A single recorded dose
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoseEvent {
    pub id: DoseId,
    pub medication_id: MedicationId,
    pub taken_at: NaiveDateTime,
}

/// Current wall-clock time as naive UTC
pub fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Accepted input formats for back-dated and edited doses
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a user-supplied UTC timestamp such as `2024-03-10T08:30`
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime> {
    let trimmed = input.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| Error::InvalidTimestamp(input.to_string()))
}
