// 📥 Emission ingestion - form submissions and CSV bulk import
//
// This is where unknown pollutant kinds and units are turned away. Every CSV
// row is keyed by file name and line, so re-importing the same file counts its
// rows as duplicates and skips them. Two rows holding the same reading are
// still two readings.
//
// CSV layout (header row required):
//   date,pollutant,amount,unit,source,notes
//   2025-01-03,CO2,40,t,Boiler 1,

use serde::Serialize;
use std::io;
use std::path::Path;

use crate::error::{CarbonError, Result};
use crate::models::{EmissionRecord, EmissionSubmission};
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: Vec<RejectedRow>,
}

impl ImportReport {
    fn reject(&mut self, line: u64, reason: String) {
        self.rejected.push(RejectedRow { line, reason });
    }

    pub fn summary(&self) -> String {
        format!(
            "{} inserted, {} duplicates skipped, {} rejected",
            self.inserted,
            self.duplicates,
            self.rejected.len()
        )
    }
}

/// Validate and store a single submission.
pub fn submit_emission<S: RecordStore + ?Sized>(
    store: &mut S,
    company_id: &str,
    submission: &EmissionSubmission,
) -> Result<EmissionRecord> {
    let record = EmissionRecord::from_submission(company_id, submission)?;
    store.insert_emission(&record)
}

pub fn import_emissions_csv<S: RecordStore + ?Sized>(
    store: &mut S,
    company_id: &str,
    csv_path: &Path,
) -> Result<ImportReport> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)?;

    let source_name = csv_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| csv_path.display().to_string());

    tracing::info!(path = %csv_path.display(), company_id, "importing emissions");
    import_rows(store, company_id, &source_name, reader)
}

/// Import from any reader. `source_name` plays the role of the file name in
/// each row's import key, so the same name must be passed on re-import.
pub fn import_emissions_reader<S: RecordStore + ?Sized, R: io::Read>(
    store: &mut S,
    company_id: &str,
    source_name: &str,
    input: R,
) -> Result<ImportReport> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);

    import_rows(store, company_id, source_name, reader)
}

fn import_rows<S: RecordStore + ?Sized, R: io::Read>(
    store: &mut S,
    company_id: &str,
    source_name: &str,
    mut reader: csv::Reader<R>,
) -> Result<ImportReport> {
    // Fail the whole import for an unknown company rather than every row
    store.get_company(company_id)?;

    let headers = reader.headers()?.clone();
    let mut report = ImportReport::default();

    for result in reader.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                report.reject(line, e.to_string());
                continue;
            }
        };
        let line = row.position().map(|p| p.line()).unwrap_or(0);

        let submission: EmissionSubmission = match row.deserialize(Some(&headers)) {
            Ok(submission) => submission,
            Err(e) => {
                report.reject(line, e.to_string());
                continue;
            }
        };

        let inserted = EmissionRecord::from_submission(company_id, &submission)
            .map(|record| record.with_import_key(format!("{}:{}", source_name, line)))
            .and_then(|record| store.insert_emission(&record));

        match inserted {
            Ok(_) => report.inserted += 1,
            Err(CarbonError::Duplicate(_)) => report.duplicates += 1,
            Err(e) if e.is_validation() => {
                tracing::warn!(line, error = %e, "rejected emission row");
                report.reject(line, e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        company_id,
        inserted = report.inserted,
        duplicates = report.duplicates,
        rejected = report.rejected.len(),
        "emission import finished"
    );

    Ok(report)
}
