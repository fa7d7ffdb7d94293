//! Diagnosis event parser.
//!
//! Each row associates a patient with a coded diagnosis and a date:
//! patient id (0), code system (2), code (3), date (7, ISO). Rows
//! carrying a non-ICD-10 code are remapped through the ICD-9 table
//! when possible and skipped otherwise. The first bladder-cancer
//! related code of a patient marks their event-of-interest date.

use std::path::Path;

use log::info;
use rustc_hash::FxHashMap;

use crate::error::{Result, ResultExt, TrajanError};
use crate::input::parse_iso_date;
use crate::models::{Codebook, PatientStore};

const ICD10_SYSTEM: &str = "ICD-10-CM";
const MIN_COLUMNS: usize = 8;

/// Counters from the diagnosis event pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosisParseSummary {
    /// Rows read.
    pub total: usize,
    /// Rows remapped from ICD-9.
    pub remapped_icd9: usize,
    /// Rows whose code is excluded from analysis.
    pub excluded: usize,
    /// Rows for patients absent from the patient table.
    pub unknown_patients: usize,
    /// Non-ICD-10 rows without a remapping.
    pub unknown_codes: usize,
    /// Patients whose event-of-interest date was set.
    pub events_of_interest: usize,
}

/// Whether a code marks the event of interest (bladder cancer
/// history or a C67 diagnosis).
#[must_use]
pub fn is_event_of_interest(code: &str) -> bool {
    code == "Z85.1" || code.starts_with("C67")
}

/// Parse the diagnosis events and fill in patient histories.
///
/// Call [`PatientStore::canonicalize`] afterwards (the experiment
/// does so once treatment codes are injected as well).
///
/// # Errors
/// Fails when the file cannot be read, a row is malformed, or a
/// date does not parse.
pub fn parse_diagnosis_events(
    path: &Path,
    store: &mut PatientStore,
    codebook: &Codebook,
    icd9_to_icd10: &FxHashMap<String, String>,
) -> Result<DiagnosisParseSummary> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_path_context("cannot open diagnosis events", path)?;

    let mut summary = DiagnosisParseSummary::default();

    for (row, record) in reader.records().enumerate() {
        let record = record.with_path_context("cannot read diagnosis events", path)?;
        if record.len() < MIN_COLUMNS {
            return Err(TrajanError::input_at(
                format!(
                    "diagnosis row {} has {} columns, expected at least {MIN_COLUMNS}",
                    row + 1,
                    record.len()
                ),
                path,
            )
            .into());
        }
        summary.total += 1;

        let Some(pid) = store.resolve(&record[0]) else {
            summary.unknown_patients += 1;
            continue;
        };

        let mut code = record[3].to_string();
        if &record[2] != ICD10_SYSTEM {
            match icd9_to_icd10.get(&code) {
                Some(mapped) => {
                    code = mapped.clone();
                    summary.remapped_icd9 += 1;
                }
                None => {
                    summary.unknown_codes += 1;
                    continue;
                }
            }
        }

        let date = parse_iso_date(&record[7])?;
        let dids = codebook.resolve(&code);
        if dids.is_empty() {
            summary.excluded += 1;
            continue;
        }
        let patient = store.get_mut(pid);
        for &did in &dids {
            patient.add_diagnosis(did, date);
        }
        if patient.eoi_date.is_none() && is_event_of_interest(&code) {
            patient.eoi_date = Some(date);
            summary.events_of_interest += 1;
        }
    }

    info!(
        "Parsed {} diagnosis rows: {} remapped from ICD-9, {} excluded from analysis, \
         {} for unknown patients, {} unmappable codes, {} events of interest",
        summary.total,
        summary.remapped_icd9,
        summary.excluded,
        summary.unknown_patients,
        summary.unknown_codes,
        summary.events_of_interest
    );
    Ok(summary)
}
