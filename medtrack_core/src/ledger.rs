//! In-memory view of the journal.
//!
//! The ledger is rebuilt by replaying journal entries in order. Entries that
//! contradict the state built so far (a dose for a deleted medication, a
//! duplicate id) are logged and skipped, so one bad line never hides the
//! rest of the history.

use crate::display::NextDoseDisplay;
use crate::eligibility::Eligibility;
use crate::journal::JournalEntry;
use crate::types::{DoseEvent, DoseId, Medication, MedicationId};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Replayed medications and doses
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    medications: BTreeMap<MedicationId, Medication>,
    doses: BTreeMap<DoseId, DoseEvent>,
    last_medication_id: u32,
    last_dose_id: u32,
}

/// Index-view row for one medication
#[derive(Clone, Debug)]
pub struct MedicationStatus {
    pub medication: Medication,
    pub last_dose: Option<DoseEvent>,
    pub eligibility: Eligibility,
    pub display: NextDoseDisplay,
}

impl Ledger {
    /// Build a ledger from journal entries, skipping inconsistent ones
    pub fn replay(entries: &[JournalEntry]) -> Self {
        let mut ledger = Self::default();
        for (idx, entry) in entries.iter().enumerate() {
            if let Err(e) = ledger.apply(entry) {
                tracing::warn!("Skipping journal entry {}: {}", idx + 1, e);
            }
        }
        tracing::debug!(
            "Replayed {} medications and {} doses",
            ledger.medications.len(),
            ledger.doses.len()
        );
        ledger
    }

    /// Apply a single entry
    pub fn apply(&mut self, entry: &JournalEntry) -> Result<()> {
        match entry {
            JournalEntry::MedicationAdded { medication } => {
                if self.medications.contains_key(&medication.id) {
                    return Err(Error::Journal(format!(
                        "medication {} added twice",
                        medication.id
                    )));
                }
                self.last_medication_id = self.last_medication_id.max(medication.id.0);
                self.medications.insert(medication.id, medication.clone());
            }
            JournalEntry::MedicationDeleted { id } => {
                self.medications
                    .remove(id)
                    .ok_or(Error::MedicationNotFound(*id))?;
                self.doses.retain(|_, dose| dose.medication_id != *id);
            }
            JournalEntry::DoseRecorded { dose } => {
                if !self.medications.contains_key(&dose.medication_id) {
                    return Err(Error::MedicationNotFound(dose.medication_id));
                }
                if self.doses.contains_key(&dose.id) {
                    return Err(Error::Journal(format!("dose {} recorded twice", dose.id)));
                }
                self.last_dose_id = self.last_dose_id.max(dose.id.0);
                self.doses.insert(dose.id, dose.clone());
            }
            JournalEntry::DoseEdited { id, taken_at } => {
                let dose = self.doses.get_mut(id).ok_or(Error::DoseNotFound(*id))?;
                dose.taken_at = *taken_at;
            }
            JournalEntry::DoseDeleted { id } => {
                self.doses.remove(id).ok_or(Error::DoseNotFound(*id))?;
            }
            JournalEntry::IdsReserved {
                last_medication_id,
                last_dose_id,
            } => {
                self.last_medication_id = self.last_medication_id.max(last_medication_id.0);
                self.last_dose_id = self.last_dose_id.max(last_dose_id.0);
            }
        }
        Ok(())
    }

    /// Minimal entry list that replays to this ledger, next ids included
    pub fn snapshot(&self) -> Vec<JournalEntry> {
        let live_medication_id = self.medications.keys().next_back().map_or(0, |id| id.0);
        let live_dose_id = self.doses.keys().next_back().map_or(0, |id| id.0);
        let reserved = (self.last_medication_id > live_medication_id
            || self.last_dose_id > live_dose_id)
            .then(|| JournalEntry::IdsReserved {
                last_medication_id: MedicationId(self.last_medication_id),
                last_dose_id: DoseId(self.last_dose_id),
            });

        let meds = self
            .medications
            .values()
            .map(|m| JournalEntry::MedicationAdded {
                medication: m.clone(),
            });
        let doses = self
            .doses
            .values()
            .map(|d| JournalEntry::DoseRecorded { dose: d.clone() });
        reserved.into_iter().chain(meds).chain(doses).collect()
    }

    /// All medications, ordered by id
    pub fn medications(&self) -> impl Iterator<Item = &Medication> {
        self.medications.values()
    }

    pub fn medication(&self, id: MedicationId) -> Result<&Medication> {
        self.medications
            .get(&id)
            .ok_or(Error::MedicationNotFound(id))
    }

    pub fn dose(&self, id: DoseId) -> Result<&DoseEvent> {
        self.doses.get(&id).ok_or(Error::DoseNotFound(id))
    }

    pub fn next_medication_id(&self) -> MedicationId {
        MedicationId(self.last_medication_id + 1)
    }

    pub fn next_dose_id(&self) -> DoseId {
        DoseId(self.last_dose_id + 1)
    }

    /// Doses of one medication, oldest first
    pub fn doses_for(&self, id: MedicationId) -> Result<Vec<&DoseEvent>> {
        self.medication(id)?;
        let mut doses: Vec<_> = self
            .doses
            .values()
            .filter(|d| d.medication_id == id)
            .collect();
        doses.sort_by_key(|d| (d.taken_at, d.id));
        Ok(doses)
    }

    /// Dose timestamps of one medication, ascending
    pub fn dose_times(&self, id: MedicationId) -> Result<Vec<NaiveDateTime>> {
        Ok(self.doses_for(id)?.into_iter().map(|d| d.taken_at).collect())
    }

    /// Most recent dose by timestamp
    pub fn last_dose(&self, id: MedicationId) -> Result<Option<&DoseEvent>> {
        Ok(self.doses_for(id)?.pop())
    }

    /// Evaluate the medication's policy against its history
    pub fn eligibility(&self, id: MedicationId, now: NaiveDateTime) -> Result<Eligibility> {
        let medication = self.medication(id)?;
        let times = self.dose_times(id)?;
        Ok(medication.policy.eligibility(&times, now))
    }

    pub fn status(&self, id: MedicationId, now: NaiveDateTime) -> Result<MedicationStatus> {
        let medication = self.medication(id)?.clone();
        let last_dose = self.last_dose(id)?.cloned();
        let eligibility = self.eligibility(id, now)?;
        Ok(MedicationStatus {
            medication,
            last_dose,
            display: NextDoseDisplay::new(eligibility.next_allowed, now),
            eligibility,
        })
    }
}
