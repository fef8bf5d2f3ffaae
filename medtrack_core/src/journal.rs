//! Append-only dose journal.
//!
//! Every change to medications and doses is appended to a JSONL (JSON Lines)
//! file. Access is serialized through an fs2 lock on a sidecar `.lock` file:
//! readers take a shared lock, writers hold an exclusive lock across the
//! whole read-check-append sequence so that two concurrent "take dose"
//! commands cannot both pass the eligibility gate.

use crate::ledger::Ledger;
use crate::types::{DoseEvent, DoseId, Medication, MedicationId};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One line of the journal
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    MedicationAdded { medication: Medication },
    MedicationDeleted { id: MedicationId },
    DoseRecorded { dose: DoseEvent },
    DoseEdited { id: DoseId, taken_at: NaiveDateTime },
    DoseDeleted { id: DoseId },
    /// Highest ids ever issued, kept by compaction once deletes are dropped
    IdsReserved {
        last_medication_id: MedicationId,
        last_dose_id: DoseId,
    },
}

/// Outcome of [`Journal::compact`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactionReport {
    pub entries_before: usize,
    pub entries_after: usize,
}

/// JSONL journal with file locking
#[derive(Clone, Debug)]
pub struct Journal {
    path: PathBuf,
    lock_path: PathBuf,
}

impl Journal {
    /// Create a journal handle for the given path. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("wal.lock");
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn open_lock(&self) -> Result<File> {
        self.ensure_parent_dir()?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        Ok(file)
    }

    /// Read all entries under a shared lock
    pub fn read_entries(&self) -> Result<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let entries = read_entries_unlocked(&self.path);
        lock.unlock()?;
        entries
    }

    /// Replay the journal into a ledger
    pub fn load(&self) -> Result<Ledger> {
        let entries = self.read_entries()?;
        Ok(Ledger::replay(&entries))
    }

    /// Run a read-modify-append transaction under the exclusive lock.
    ///
    /// The closure sees the current ledger and returns the entries to append
    /// plus a value handed back to the caller. Nothing is written if the
    /// closure fails.
    pub fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Ledger) -> Result<(Vec<JournalEntry>, T)>,
    {
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;

        let result = self.transact_locked(f);

        // Lock is released when the file is dropped, unlock explicitly anyway
        lock.unlock()?;
        result
    }

    fn transact_locked<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Ledger) -> Result<(Vec<JournalEntry>, T)>,
    {
        let ledger = Ledger::replay(&read_entries_unlocked(&self.path)?);
        let (entries, value) = f(&ledger)?;
        if !entries.is_empty() {
            append_unlocked(&self.path, &entries)?;
            tracing::debug!("Appended {} entries to journal", entries.len());
        }
        Ok(value)
    }

    /// Rewrite the journal as the minimal entry set for the current ledger.
    ///
    /// The new journal is written to a temp file in the same directory,
    /// synced, then renamed over the old one.
    pub fn compact(&self) -> Result<CompactionReport> {
        if !self.path.exists() {
            return Ok(CompactionReport {
                entries_before: 0,
                entries_after: 0,
            });
        }

        let lock = self.open_lock()?;
        lock.lock_exclusive()?;
        let result = self.compact_locked();
        lock.unlock()?;
        result
    }

    fn compact_locked(&self) -> Result<CompactionReport> {
        let entries = read_entries_unlocked(&self.path)?;
        let snapshot = Ledger::replay(&entries).snapshot();

        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "journal path missing parent")
        })?;
        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            write_entries(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        let report = CompactionReport {
            entries_before: entries.len(),
            entries_after: snapshot.len(),
        };
        tracing::info!(
            "Compacted journal {:?}: {} -> {} entries",
            self.path,
            report.entries_before,
            report.entries_after
        );
        Ok(report)
    }
}

fn read_entries_unlocked(path: &Path) -> Result<Vec<JournalEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<JournalEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!("Failed to parse journal entry at line {}: {}", line_num + 1, e);
            }
        }
    }

    tracing::debug!("Read {} entries from journal", entries.len());
    Ok(entries)
}

fn append_unlocked(path: &Path, entries: &[JournalEntry]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    // A crash mid-write can leave the last line unterminated
    let needs_newline = if file.metadata()?.len() > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        last[0] != b'\n'
    } else {
        false
    };

    let mut writer = BufWriter::new(&file);
    if needs_newline {
        tracing::warn!("Journal {:?} ends with a partial line, terminating it", path);
        writer.write_all(b"\n")?;
    }
    write_entries(&mut writer, entries)?;
    writer.flush()?;
    drop(writer);
    file.sync_data()?;
    Ok(())
}

fn write_entries<W: Write>(writer: &mut W, entries: &[JournalEntry]) -> Result<()> {
    for entry in entries {
        let line = serde_json::to_string(entry)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DosePolicy;
    use chrono::NaiveDate;

    fn med(id: u32, name: &str) -> Medication {
        Medication {
            id: MedicationId(id),
            name: name.into(),
            policy: DosePolicy::new(4, 3).unwrap(),
        }
    }

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn dose(id: u32, med: u32, h: u32) -> JournalEntry {
        JournalEntry::DoseRecorded {
            dose: DoseEvent {
                id: DoseId(id),
                medication_id: MedicationId(med),
                taken_at: at(h),
            },
        }
    }

    #[test]
    fn test_transact_appends_and_reads_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(temp_dir.path().join("journal/doses.wal"));

        journal
            .transact(|_| {
                Ok((
                    vec![
                        JournalEntry::MedicationAdded {
                            medication: med(1, "Ibuprofen"),
                        },
                        dose(1, 1, 8),
                    ],
                    (),
                ))
            })
            .unwrap();

        let entries = journal.read_entries().unwrap();
        assert_eq!(entries.len(), 2);

        let ledger = journal.load().unwrap();
        assert_eq!(ledger.dose_times(MedicationId(1)).unwrap(), vec![at(8)]);
    }

    #[test]
    fn test_failed_transaction_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(temp_dir.path().join("doses.wal"));

        let result: Result<()> = journal.transact(|_| Err(Error::Journal("nope".into())));
        assert!(result.is_err());
        assert!(journal.read_entries().unwrap().is_empty());
    }

    #[test]
    fn test_read_missing_journal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(temp_dir.path().join("nonexistent.wal"));

        assert!(journal.read_entries().unwrap().is_empty());
        // Reading must not create the data directory layout
        assert!(!journal.path().exists());
    }

    #[test]
    fn test_corrupted_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("doses.wal");
        let good = serde_json::to_string(&JournalEntry::MedicationAdded {
            medication: med(1, "Ibuprofen"),
        })
        .unwrap();
        std::fs::write(&path, format!("{{ invalid json }}\n{}\n\n{{\"op\":\"dose_rec", good)).unwrap();

        let entries = Journal::new(&path).read_entries().unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_append_after_partial_line() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("doses.wal");
        let good = serde_json::to_string(&JournalEntry::MedicationAdded {
            medication: med(1, "Ibuprofen"),
        })
        .unwrap();
        std::fs::write(&path, format!("{}\n{{\"op\":\"dose_rec", good)).unwrap();

        let journal = Journal::new(&path);
        journal
            .transact(|ledger| Ok((vec![dose(ledger.next_dose_id().0, 1, 8)], ())))
            .unwrap();

        let ledger = journal.load().unwrap();
        assert_eq!(ledger.dose_times(MedicationId(1)).unwrap(), vec![at(8)]);
    }

    #[test]
    fn test_entry_wire_format() {
        let line = serde_json::to_string(&JournalEntry::DoseDeleted { id: DoseId(3) }).unwrap();
        assert_eq!(line, r#"{"op":"dose_deleted","id":3}"#);

        let line = serde_json::to_string(&dose(1, 2, 8)).unwrap();
        assert!(line.contains(r#""taken_at":"2024-03-10T08:00:00""#));
    }

    #[test]
    fn test_compact_preserves_ledger() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(temp_dir.path().join("doses.wal"));

        journal
            .transact(|_| {
                Ok((
                    vec![
                        JournalEntry::MedicationAdded {
                            medication: med(1, "Ibuprofen"),
                        },
                        JournalEntry::MedicationAdded {
                            medication: med(2, "Paracetamol"),
                        },
                        dose(1, 1, 8),
                        dose(2, 1, 9),
                        dose(3, 2, 10),
                        JournalEntry::DoseEdited {
                            id: DoseId(1),
                            taken_at: at(7),
                        },
                        JournalEntry::DoseDeleted { id: DoseId(2) },
                        JournalEntry::MedicationDeleted { id: MedicationId(2) },
                    ],
                    (),
                ))
            })
            .unwrap();

        let before = journal.load().unwrap();
        let report = journal.compact().unwrap();
        let after = journal.load().unwrap();

        assert_eq!(report.entries_before, 8);
        assert_eq!(report.entries_after, 3);
        assert_eq!(before.snapshot(), after.snapshot());
        assert_eq!(after.dose_times(MedicationId(1)).unwrap(), vec![at(7)]);

        // Ids of deleted records are not handed out again
        assert_eq!(after.next_medication_id(), MedicationId(3));
        assert_eq!(after.next_dose_id(), DoseId(4));

        // Only the journal and its lock file remain
        let mut names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["doses.wal", "doses.wal.lock"]);
    }

    #[test]
    fn test_concurrent_transactions_are_serialized() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(temp_dir.path().join("doses.wal"));
        journal
            .transact(|_| {
                Ok((
                    vec![JournalEntry::MedicationAdded {
                        medication: med(1, "Ibuprofen"),
                    }],
                    (),
                ))
            })
            .unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let journal = journal.clone();
                scope.spawn(move || {
                    journal
                        .transact(|ledger| {
                            let id = ledger.next_dose_id();
                            Ok((vec![dose(id.0, 1, 8)], ()))
                        })
                        .unwrap();
                });
            }
        });

        // Every writer saw the previous writer's dose, so ids are unique
        let ledger = journal.load().unwrap();
        assert_eq!(ledger.doses_for(MedicationId(1)).unwrap().len(), 8);
    }
}
