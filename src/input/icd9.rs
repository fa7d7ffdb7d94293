//! ICD-9 to ICD-10 remapping table (a flat JSON object of strings).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::info;
use rustc_hash::FxHashMap;

use crate::error::{Result, ResultExt};

/// Load the remapping table.
///
/// # Errors
/// Fails when the file cannot be read or is not a JSON object of
/// strings.
pub fn parse_icd9_to_icd10(path: &Path) -> Result<FxHashMap<String, String>> {
    let file = File::open(path).with_path_context("cannot open ICD-9 mapping", path)?;
    let mapping: FxHashMap<String, String> = serde_json::from_reader(BufReader::new(file))
        .with_path_context("cannot parse ICD-9 mapping", path)?;
    info!("Parsed {} ICD-9 to ICD-10 mappings", mapping.len());
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_a_flat_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"001": "A00", "4019": "I10"}}"#).unwrap();
        let mapping = parse_icd9_to_icd10(file.path()).unwrap();
        assert_eq!(mapping.get("001"), Some(&"A00".to_string()));
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn rejects_non_object_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        assert!(parse_icd9_to_icd10(file.path()).is_err());
    }
}
