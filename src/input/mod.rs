//! Input boundary: CSV/XML/JSON parsers for the source tables.

pub mod ccsr;
pub mod diagnoses;
pub mod hierarchy;
pub mod icd9;
pub mod patients;
pub mod treatment;
pub mod tumor;

pub use diagnoses::{parse_diagnosis_events, DiagnosisParseSummary};
pub use hierarchy::parse_hierarchy;
pub use icd9::parse_icd9_to_icd10;
pub use patients::parse_patient_table;
pub use treatment::{inject_treatment_codes, parse_treatment_table, TreatmentInfo};
pub use tumor::{parse_tumor_table, TumorInfo, TumorMap};

use chrono::NaiveDate;

use crate::error::{Result, TrajanError};

/// Parse a `YYYY-MM-DD` date, ignoring anything after the day.
pub(crate) fn parse_iso_date(value: &str) -> Result<NaiveDate> {
    let head = value.get(..10).ok_or_else(|| {
        TrajanError::input(format!("date too short: {value:?}"))
    })?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .map_err(|e| TrajanError::input(format!("unknown date format {value:?}: {e}")).into())
}
