//! Patient table parser.
//!
//! The table is headerless CSV with twelve columns; the analysis
//! uses the identifier (0), sex (1, `M`/`F`), year of birth (4),
//! region (6), and month of death (10, `YYYYMM`). Rows without a
//! parsable year of birth or sex are skipped, matching the source
//! data's convention that such patients cannot be stratified.

use std::path::Path;

use chrono::NaiveDate;
use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::error::{Result, ResultExt, TrajanError};
use crate::models::{PatientStore, Sex};

const MIN_COLUMNS: usize = 11;

/// Parse the patient table into a fresh store.
///
/// # Errors
/// Fails when the file cannot be read or a row is malformed.
pub fn parse_patient_table(path: &Path) -> Result<PatientStore> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_path_context("cannot open patient table", path)?;

    let mut store = PatientStore::new();
    let mut region_ids: FxHashMap<String, usize> = FxHashMap::default();
    let mut skipped_yob = 0usize;
    let mut skipped_sex = 0usize;
    let mut deaths = 0usize;

    for (row, record) in reader.records().enumerate() {
        let record = record.with_path_context("cannot read patient table", path)?;
        if record.len() < MIN_COLUMNS {
            return Err(TrajanError::input_at(
                format!(
                    "patient row {} has {} columns, expected at least {MIN_COLUMNS}",
                    row + 1,
                    record.len()
                ),
                path,
            )
            .into());
        }
        let Ok(year_of_birth) = record[4].parse::<i32>() else {
            skipped_yob += 1;
            continue;
        };
        let sex = match &record[1] {
            "M" => Sex::Male,
            "F" => Sex::Female,
            _ => {
                skipped_sex += 1;
                continue;
            }
        };
        let death_date = parse_death_month(&record[10]);
        if death_date.is_some() {
            deaths += 1;
        }
        let next_region = region_ids.len();
        let region = *region_ids
            .entry(record[6].to_string())
            .or_insert(next_region);
        store.insert(record[0].to_string(), year_of_birth, sex, region, death_date);
    }

    if skipped_yob > 0 {
        warn!("Skipped {skipped_yob} patients without a year of birth");
    }
    if skipped_sex > 0 {
        warn!("Skipped {skipped_sex} patients without a recorded sex");
    }
    info!(
        "Parsed {} patients ({} female, {} male), {} with a known date of death, {} regions",
        store.len(),
        store.female_count,
        store.male_count,
        deaths,
        store.nof_regions
    );
    if let (Some(min), Some(max)) = (store.min_year_of_birth(), store.max_year_of_birth()) {
        info!("Year of birth range: {min}..{max}");
    }
    Ok(store)
}

/// A death month `YYYYMM`; the day is unknown and defaults to the
/// first.
fn parse_death_month(value: &str) -> Option<NaiveDate> {
    if value.len() != 6 {
        return None;
    }
    let year = value[0..4].parse::<i32>().ok()?;
    let month = value[4..6].parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}
