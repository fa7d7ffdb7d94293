//! Tumor stage table parser.
//!
//! Rows record staged bladder-cancer findings per patient: patient
//! id (0), date (1), tumor site (4), and the T/N/M stages in columns
//! 10..=12, written as `prefix_stage` (`c_T2`). Only bladder tumors
//! (site `C67*`) are kept. The overall stage is derived from the
//! T/N/M triple following the AJCC grouping for bladder cancer.

use std::path::Path;

use chrono::NaiveDate;
use log::info;
use rustc_hash::FxHashMap;

use crate::error::{Result, ResultExt, TrajanError};
use crate::input::parse_iso_date;

const MIN_COLUMNS: usize = 13;

/// One staged tumor finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TumorInfo {
    pub t_stage: String,
    pub n_stage: String,
    pub m_stage: String,
    /// Overall stage derived from the T/N/M triple.
    pub stage: String,
    pub date: NaiveDate,
}

/// Findings per external patient id, in file order (chronological in
/// the source data).
pub type TumorMap = FxHashMap<String, Vec<TumorInfo>>;

/// Parse the tumor table.
///
/// # Errors
/// Fails when the file cannot be read or a kept row is malformed.
pub fn parse_tumor_table(path: &Path) -> Result<TumorMap> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_path_context("cannot open tumor table", path)?;

    let mut result: TumorMap = FxHashMap::default();
    let mut kept = 0usize;
    for (row, record) in reader.records().enumerate() {
        let record = record.with_path_context("cannot read tumor table", path)?;
        if record.len() < MIN_COLUMNS {
            return Err(TrajanError::input_at(
                format!(
                    "tumor row {} has {} columns, expected at least {MIN_COLUMNS}",
                    row + 1,
                    record.len()
                ),
                path,
            )
            .into());
        }
        let site = record[4].split('.').next().unwrap_or("");
        if site != "C67" {
            continue;
        }
        let (Some(t_stage), Some(n_stage), Some(m_stage)) = (
            stage_suffix(&record[10]),
            stage_suffix(&record[11]),
            stage_suffix(&record[12]),
        ) else {
            continue;
        };
        let date = parse_iso_date(&record[1])?;
        let stage = overall_stage(&t_stage, &n_stage, &m_stage);
        result
            .entry(record[0].to_string())
            .or_default()
            .push(TumorInfo {
                t_stage,
                n_stage,
                m_stage,
                stage,
                date,
            });
        kept += 1;
    }
    info!(
        "Parsed tumor info: {kept} bladder findings for {} patients",
        result.len()
    );
    Ok(result)
}

/// The stage part of a `prefix_stage` cell, when present.
fn stage_suffix(value: &str) -> Option<String> {
    let mut parts = value.splitn(2, '_');
    let _prefix = parts.next()?;
    parts.next().map(ToString::to_string)
}

/// Overall bladder-cancer stage from a T/N/M triple.
///
/// Stage 0a is Ta,N0,M0; stage 0is is Tis,N0,M0; stages I..IIIB
/// follow tumor size and lymph-node involvement; any M1a is IVA and
/// any M1b is IVB. Triples outside the table concatenate verbatim.
#[must_use]
pub fn overall_stage(t_stage: &str, n_stage: &str, m_stage: &str) -> String {
    if n_stage == "N0" && m_stage == "M0" {
        match t_stage {
            "Ta" => return "0a".to_string(),
            "Tis" => return "0is".to_string(),
            "T1" => return "I".to_string(),
            "T2" => return "II".to_string(),
            "T3a" | "T3b" | "T4a" => return "IIIA".to_string(),
            _ => {}
        }
    }
    if n_stage == "N1" && m_stage == "M0" {
        if matches!(
            t_stage,
            "T1" | "T1a" | "T1b" | "T2" | "T2a" | "T2b" | "T3" | "T3a" | "T3b" | "T4a"
        ) {
            return "IIIA".to_string();
        }
    }
    if (n_stage == "N2" || n_stage == "N3") && m_stage == "M0" {
        if matches!(
            t_stage,
            "T1" | "T1a" | "T1b" | "T2" | "T2a" | "T2b" | "T3" | "T3a" | "T3b" | "T4" | "T4a"
        ) {
            return "IIIB".to_string();
        }
    }
    if t_stage == "T4b" && m_stage == "M0" {
        return "IVA".to_string();
    }
    if m_stage == "M1a" {
        return "IVA".to_string();
    }
    if m_stage == "M1b" {
        return "IVB".to_string();
    }
    format!("{t_stage}{n_stage}{m_stage}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn keeps_only_bladder_rows_with_complete_staging() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "p1,2020-01-01,x,y,C67.2,a,b,c,d,e,c_T2,c_N0,c_M0,f"
        )
        .unwrap();
        writeln!(file, "p1,2021-01-01,x,y,C50.1,a,b,c,d,e,c_T2,c_N0,c_M0,f").unwrap();
        writeln!(file, "p2,2020-06-01,x,y,C67,a,b,c,d,e,unknown,c_N0,c_M0,f").unwrap();
        let map = parse_tumor_table(file.path()).unwrap();
        assert_eq!(map.len(), 1);
        let infos = &map["p1"];
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].t_stage, "T2");
        assert_eq!(infos[0].stage, "II");
    }

    #[test]
    fn stage_grouping_follows_the_table() {
        assert_eq!(overall_stage("Ta", "N0", "M0"), "0a");
        assert_eq!(overall_stage("Tis", "N0", "M0"), "0is");
        assert_eq!(overall_stage("T1", "N0", "M0"), "I");
        assert_eq!(overall_stage("T3a", "N0", "M0"), "IIIA");
        assert_eq!(overall_stage("T2", "N1", "M0"), "IIIA");
        assert_eq!(overall_stage("T2", "N2", "M0"), "IIIB");
        assert_eq!(overall_stage("T4b", "N1", "M0"), "IVA");
        assert_eq!(overall_stage("T1", "N0", "M1a"), "IVA");
        assert_eq!(overall_stage("T1", "N0", "M1b"), "IVB");
        assert_eq!(overall_stage("T9", "N9", "M9"), "T9N9M9");
    }
}
