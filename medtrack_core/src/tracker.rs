//! Tracker service: medication and dose operations over the journal.
//!
//! Read paths (`statuses`, `history`) and the write-path gate (`take_dose`)
//! share the same eligibility evaluation from [`crate::eligibility`].

use crate::eligibility::Eligibility;
use crate::journal::{CompactionReport, Journal, JournalEntry};
use crate::ledger::{Ledger, MedicationStatus};
use crate::types::{DoseEvent, DoseId, DosePolicy, Medication, MedicationId};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use std::path::Path;

/// History-view payload for one medication
#[derive(Clone, Debug)]
pub struct MedicationHistory {
    pub status: MedicationStatus,
    /// All doses, oldest first
    pub doses: Vec<DoseEvent>,
}

/// Medication tracker backed by a journal under the data directory
#[derive(Clone, Debug)]
pub struct Tracker {
    journal: Journal,
}

impl Tracker {
    /// Tracker storing its journal at `<data_dir>/journal/doses.wal`
    pub fn open(data_dir: &Path) -> Self {
        Self::with_journal(Journal::new(data_dir.join("journal").join("doses.wal")))
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self { journal }
    }

    /// Current replayed state
    pub fn ledger(&self) -> Result<Ledger> {
        self.journal.load()
    }

    pub fn add_medication(&self, name: &str, policy: DosePolicy) -> Result<Medication> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("medication name is empty".into()));
        }
        policy.validate()?;

        let medication = self.journal.transact(|ledger| {
            let medication = Medication {
                id: ledger.next_medication_id(),
                name: name.to_string(),
                policy,
            };
            Ok((
                vec![JournalEntry::MedicationAdded {
                    medication: medication.clone(),
                }],
                medication,
            ))
        })?;

        tracing::info!("Added medication {} ({})", medication.id, medication.name);
        Ok(medication)
    }

    /// Delete a medication and its whole dose history.
    ///
    /// Returns the removed medication and the number of doses dropped with it.
    pub fn delete_medication(&self, id: MedicationId) -> Result<(Medication, usize)> {
        let removed = self.journal.transact(|ledger| {
            let medication = ledger.medication(id)?.clone();
            let dose_count = ledger.doses_for(id)?.len();
            Ok((
                vec![JournalEntry::MedicationDeleted { id }],
                (medication, dose_count),
            ))
        })?;

        tracing::info!(
            "Deleted medication {} with {} doses",
            removed.0.id,
            removed.1
        );
        Ok(removed)
    }

    /// Evaluate whether a dose may be taken at `now` without recording it
    pub fn check_dose(&self, id: MedicationId, now: NaiveDateTime) -> Result<Eligibility> {
        self.ledger()?.eligibility(id, now)
    }

    /// Record a dose at `now` if the medication's policy allows it.
    ///
    /// The check and the append happen under the same exclusive journal
    /// lock, so concurrent callers cannot both pass the gate.
    pub fn take_dose(&self, id: MedicationId, now: NaiveDateTime) -> Result<DoseEvent> {
        let dose = self.journal.transact(|ledger| {
            let medication = ledger.medication(id)?;
            let eligibility = ledger.eligibility(id, now)?;
            if !eligibility.is_eligible() {
                tracing::info!(
                    "Refused dose of {}: {:?} until {}",
                    medication.name,
                    eligibility.constraint,
                    eligibility.next_allowed
                );
                return Err(Error::DoseNotAllowed {
                    medication: medication.name.clone(),
                    next_allowed: eligibility.next_allowed,
                    constraint: eligibility.constraint,
                });
            }

            let dose = DoseEvent {
                id: ledger.next_dose_id(),
                medication_id: id,
                taken_at: now,
            };
            Ok((vec![JournalEntry::DoseRecorded { dose: dose.clone() }], dose))
        })?;

        tracing::info!("Recorded dose {} at {}", dose.id, dose.taken_at);
        Ok(dose)
    }

    /// Record a back-dated dose. Not gated: the user is logging the past.
    pub fn add_past_dose(&self, id: MedicationId, taken_at: NaiveDateTime) -> Result<DoseEvent> {
        let dose = self.journal.transact(|ledger| {
            ledger.medication(id)?;
            let dose = DoseEvent {
                id: ledger.next_dose_id(),
                medication_id: id,
                taken_at,
            };
            Ok((vec![JournalEntry::DoseRecorded { dose: dose.clone() }], dose))
        })?;

        tracing::info!("Recorded past dose {} at {}", dose.id, dose.taken_at);
        Ok(dose)
    }

    /// Change the timestamp of an existing dose
    pub fn edit_dose(&self, id: DoseId, taken_at: NaiveDateTime) -> Result<DoseEvent> {
        let dose = self.journal.transact(|ledger| {
            let mut dose = ledger.dose(id)?.clone();
            dose.taken_at = taken_at;
            Ok((vec![JournalEntry::DoseEdited { id, taken_at }], dose))
        })?;

        tracing::info!("Moved dose {} to {}", dose.id, dose.taken_at);
        Ok(dose)
    }

    pub fn delete_dose(&self, id: DoseId) -> Result<DoseEvent> {
        let dose = self.journal.transact(|ledger| {
            let dose = ledger.dose(id)?.clone();
            Ok((vec![JournalEntry::DoseDeleted { id }], dose))
        })?;

        tracing::info!("Deleted dose {}", dose.id);
        Ok(dose)
    }

    /// Status of every medication, ordered by id
    pub fn statuses(&self, now: NaiveDateTime) -> Result<Vec<MedicationStatus>> {
        let ledger = self.ledger()?;
        ledger
            .medications()
            .map(|m| ledger.status(m.id, now))
            .collect()
    }

    pub fn history(&self, id: MedicationId, now: NaiveDateTime) -> Result<MedicationHistory> {
        let ledger = self.ledger()?;
        let status = ledger.status(id, now)?;
        let doses = ledger.doses_for(id)?.into_iter().cloned().collect();
        Ok(MedicationHistory { status, doses })
    }

    pub fn compact(&self) -> Result<CompactionReport> {
        self.journal.compact()
    }
}
