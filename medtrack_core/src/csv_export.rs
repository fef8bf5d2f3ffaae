//! CSV export of the dose history.
//!
//! One row per recorded dose, ordered by medication then time.

use crate::ledger::Ledger;
use crate::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    dose_id: u32,
    medication_id: u32,
    medication: &'a str,
    taken_at: String,
}

/// Write every dose in the ledger as CSV to `writer`, returning the row count
pub fn write_csv<W: Write>(ledger: &Ledger, writer: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut count = 0;

    for medication in ledger.medications() {
        for dose in ledger.doses_for(medication.id)? {
            writer.serialize(CsvRow {
                dose_id: dose.id.0,
                medication_id: medication.id.0,
                medication: &medication.name,
                taken_at: dose.taken_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            })?;
            count += 1;
        }
    }

    writer.flush()?;
    Ok(count)
}

/// Export the dose history to a CSV file, replacing any previous export.
///
/// The file is fsynced before returning.
pub fn export_csv(ledger: &Ledger, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    let count = write_csv(ledger, &mut file)?;
    file.sync_all()?;

    tracing::info!("Exported {} doses to {:?}", count, path);
    Ok(count)
}
