//! Treatment table parser and synthetic code injection.
//!
//! The table records bladder-cancer procedure dates per patient:
//! radical cystectomy (column 10), MVAC chemotherapy (column 11),
//! and intravesical therapy (column 13). Valid cells hold an ISO
//! date. When a treatment file is supplied, the dates become events
//! on the corresponding synthetic codes so procedures can appear in
//! trajectories.

use std::path::Path;

use chrono::NaiveDate;
use log::info;
use rustc_hash::FxHashMap;

use crate::error::{Result, ResultExt, TrajanError};
use crate::input::parse_iso_date;
use crate::models::{Codebook, PatientStore};

const MIN_COLUMNS: usize = 14;

/// Procedure dates of one patient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreatmentInfo {
    /// Date of radical cystectomy.
    pub rc_date: Option<NaiveDate>,
    /// Date of MVAC chemotherapy.
    pub mvac_date: Option<NaiveDate>,
    /// Date of intravesical therapy.
    pub ivt_date: Option<NaiveDate>,
}

/// Parse the treatment table, keyed by external patient id.
///
/// # Errors
/// Fails when the file cannot be read or a date cell is malformed.
pub fn parse_treatment_table(path: &Path) -> Result<FxHashMap<String, TreatmentInfo>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_path_context("cannot open treatment table", path)?;

    let mut result = FxHashMap::default();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_path_context("cannot read treatment table", path)?;
        if record.len() < MIN_COLUMNS {
            return Err(TrajanError::input_at(
                format!(
                    "treatment row {} has {} columns, expected at least {MIN_COLUMNS}",
                    row + 1,
                    record.len()
                ),
                path,
            )
            .into());
        }
        let info = TreatmentInfo {
            rc_date: parse_date_cell(&record[10])?,
            mvac_date: parse_date_cell(&record[11])?,
            ivt_date: parse_date_cell(&record[13])?,
        };
        result.insert(record[0].to_string(), info);
    }
    info!("Parsed treatment info for {} patients", result.len());
    Ok(result)
}

fn parse_date_cell(value: &str) -> Result<Option<NaiveDate>> {
    if value.len() != 10 {
        return Ok(None);
    }
    parse_iso_date(value).map(Some)
}

/// Add the synthetic treatment codes to patient histories.
///
/// Returns the number of patients that received at least one
/// synthetic event. Histories must be re-canonicalized afterwards.
pub fn inject_treatment_codes(
    store: &mut PatientStore,
    codebook: &Codebook,
    treatments: &FxHashMap<String, TreatmentInfo>,
) -> usize {
    let mut touched = 0usize;
    for (external_id, info) in treatments {
        let Some(pid) = store.resolve(external_id) else {
            continue;
        };
        let mut any = false;
        for (code, date) in [
            ("C98", info.rc_date),
            ("C99", info.mvac_date),
            ("C100", info.ivt_date),
        ] {
            let Some(date) = date else { continue };
            for &did in &codebook.resolve(code) {
                store.get_mut(pid).add_diagnosis(did, date);
                any = true;
            }
        }
        if any {
            touched += 1;
        }
    }
    info!("Injected synthetic treatment codes for {touched} patients");
    touched
}
