//! CCSR category table parser.
//!
//! The table has a header row and eighteen columns: code and
//! description, the default inpatient/outpatient categories, and six
//! category id/description pairs in columns 6..=17. Codes are stored
//! quoted and without the dot (`'A000'`); they are normalized to the
//! usual form (`A00.0`) so they line up with the diagnosis events.

use std::path::Path;

use log::info;

use crate::error::{Result, ResultExt, TrajanError};

const COLUMNS: usize = 18;

/// Parse the table into `(code, [(category id, label)])` rows.
///
/// # Errors
/// Fails when the file cannot be read or a row is too short.
pub fn parse_ccsr_table(path: &Path) -> Result<Vec<(String, Vec<(String, String)>)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_path_context("cannot open category table", path)?;

    let mut rows = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_path_context("cannot read category table", path)?;
        if record.len() < COLUMNS {
            return Err(TrajanError::input_at(
                format!(
                    "category row {} has {} columns, expected {COLUMNS}",
                    row + 2,
                    record.len()
                ),
                path,
            )
            .into());
        }
        let code = normalize_code(&record[0]);
        let mut categories = Vec::new();
        for i in (6..COLUMNS).step_by(2) {
            let id = strip_quotes(&record[i]).trim().to_string();
            let label = strip_quotes(&record[i + 1]).trim().to_string();
            if id.is_empty() || label.is_empty() {
                continue;
            }
            categories.push((id, label));
        }
        if !categories.is_empty() {
            rows.push((code, categories));
        }
    }
    info!("Parsed {} category rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches('\'')
}

/// Reinsert the dot the table leaves out: `'A000'` becomes `A00.0`.
fn normalize_code(raw: &str) -> String {
    let bare = strip_quotes(raw);
    if bare.len() > 3 {
        format!("{}.{}", &bare[..3], &bare[3..])
    } else {
        bare.to_string()
    }
}
