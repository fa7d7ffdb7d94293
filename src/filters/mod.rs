//! Patient and trajectory filters.
//!
//! Filters are first-class predicates selected by tag on the
//! command line and composed by logical AND. Patient filters run
//! after ingest and may trim a patient's history (age and
//! event-of-interest windows, tumor-stage selection); returning
//! false drops the patient. Trajectory filters run at emission.

use std::sync::Arc;

use crate::algorithm::trajectory::TrajectoryFilter;
use crate::error::{Result, TrajanError};
use crate::input::tumor::{TumorInfo, TumorMap};
use crate::models::{Codebook, Patient, Sex};

/// Predicate over a patient; may trim the diagnosis history.
pub type PatientFilter = Box<dyn Fn(&mut Patient) -> bool + Send + Sync>;

/// Codes that mark a trajectory as bladder-cancer related.
const BLADDER_CANCER_CODES: &[&str] = &["C67", "C77", "C78", "C79", "C98", "C99"];

/// Age bound used by the `age70+`/`age70-` tags.
const AGE_CUTOFF: i32 = 70;

/// Build the patient filters for a comma list of tags.
///
/// # Errors
/// Unknown tags are configuration errors.
pub fn patient_filters_from_tags(
    tags: &[String],
    tumor_info: &Arc<TumorMap>,
) -> Result<Vec<PatientFilter>> {
    let mut filters: Vec<PatientFilter> = Vec::new();
    for tag in tags {
        let filter: PatientFilter = match tag.trim() {
            "" | "id" => continue,
            "male" => Box::new(|p: &mut Patient| p.sex == Sex::Male),
            "female" => Box::new(|p: &mut Patient| p.sex == Sex::Female),
            "age70+" => Box::new(age_above_filter(AGE_CUTOFF)),
            "age70-" => Box::new(age_below_filter(AGE_CUTOFF)),
            "EOI+" => Box::new(eoi_filter(true)),
            "EOI-" => Box::new(eoi_filter(false)),
            "Ta" => stage_filter(tumor_info, |t| t.t_stage == "Ta"),
            "T0" => stage_filter(tumor_info, |t| t.t_stage == "T0"),
            "Tis" => stage_filter(tumor_info, |t| t.t_stage == "Tis"),
            "T1" => stage_filter(tumor_info, |t| {
                matches!(t.t_stage.as_str(), "T1" | "T1a" | "T1c")
            }),
            "T2" => stage_filter(tumor_info, |t| {
                matches!(t.t_stage.as_str(), "T2" | "T2a" | "T2b" | "T2c")
            }),
            "T3" => stage_filter(tumor_info, |t| {
                matches!(t.t_stage.as_str(), "T3" | "T3a" | "T3b")
            }),
            "T4" => stage_filter(tumor_info, |t| {
                matches!(t.t_stage.as_str(), "T4" | "T4a" | "T4b")
            }),
            "N0" => stage_filter(tumor_info, |t| t.n_stage == "N0"),
            "N1" => stage_filter(tumor_info, |t| t.n_stage == "N1"),
            "N2" => stage_filter(tumor_info, |t| t.n_stage == "N2"),
            "N3" => stage_filter(tumor_info, |t| t.n_stage == "N3"),
            "M0" => stage_filter(tumor_info, |t| t.m_stage == "M0"),
            "M1" => stage_filter(tumor_info, |t| {
                matches!(t.m_stage.as_str(), "M1" | "M1a" | "M1b")
            }),
            "NMIBC" => stage_filter(tumor_info, |t| {
                t.t_stage == "Tis"
                    || t.t_stage == "Ta"
                    || (t.t_stage == "T1" && t.n_stage == "N0" && t.m_stage == "M0")
            }),
            "MIBC" => stage_filter(tumor_info, |t| {
                t.t_stage == "T2"
                    || t.t_stage == "T3"
                    || (t.t_stage == "T4"
                        && t.m_stage == "M0"
                        && matches!(t.n_stage.as_str(), "N0" | "N1" | "N2" | "N3"))
            }),
            "mUC" => stage_filter(tumor_info, |t| {
                matches!(t.m_stage.as_str(), "M1" | "M1a" | "M1b")
            }),
            unknown => {
                return Err(
                    TrajanError::config(format!("unknown patient filter `{unknown}`")).into(),
                )
            }
        };
        filters.push(filter);
    }
    Ok(filters)
}

/// Keep patients with diagnoses past the cutoff age, discarding
/// their earlier history.
fn age_above_filter(age: i32) -> impl Fn(&mut Patient) -> bool {
    move |patient: &mut Patient| {
        let min_year = patient.year_of_birth + age;
        patient.diagnoses.retain(|d| {
            use chrono::Datelike;
            d.date.year() > min_year
        });
        !patient.diagnoses.is_empty()
    }
}

/// Keep patients with diagnoses before the cutoff age, discarding
/// their later history.
fn age_below_filter(age: i32) -> impl Fn(&mut Patient) -> bool {
    move |patient: &mut Patient| {
        let max_year = patient.year_of_birth + age - 1;
        patient.diagnoses.retain(|d| {
            use chrono::Datelike;
            d.date.year() <= max_year
        });
        !patient.diagnoses.is_empty()
    }
}

/// Split a patient's history at the event-of-interest date: `after`
/// keeps the part from the event onwards, otherwise the part up to
/// and including it. Patients without an event are dropped.
fn eoi_filter(after: bool) -> impl Fn(&mut Patient) -> bool {
    move |patient: &mut Patient| {
        let Some(eoi) = patient.eoi_date else {
            return false;
        };
        patient
            .diagnoses
            .retain(|d| if after { d.date >= eoi } else { d.date <= eoi });
        !patient.diagnoses.is_empty()
    }
}

/// Keep patients whose latest matching tumor finding satisfies the
/// predicate, trimming diagnoses dated at or after the next staging
/// change.
fn stage_filter<P>(tumor_info: &Arc<TumorMap>, predicate: P) -> PatientFilter
where
    P: Fn(&TumorInfo) -> bool + Send + Sync + 'static,
{
    let tumor_info = Arc::clone(tumor_info);
    Box::new(move |patient: &mut Patient| {
        let Some(findings) = tumor_info.get(&patient.external_id) else {
            return false;
        };
        let Some(matched) = findings.iter().rposition(&predicate) else {
            return false;
        };
        if let Some(next) = findings.get(matched + 1) {
            let cutoff = next.date;
            patient.diagnoses.retain(|d| d.date < cutoff);
        }
        true
    })
}

/// Build the trajectory filters for a comma list of tags.
///
/// # Errors
/// Unknown tags are configuration errors.
pub fn trajectory_filters_from_tags(
    tags: &[String],
    codebook: &Codebook,
) -> Result<Vec<TrajectoryFilter>> {
    let mut filters: Vec<TrajectoryFilter> = Vec::new();
    for tag in tags {
        let filter: TrajectoryFilter = match tag.trim() {
            "" | "id" => continue,
            "neoplasm" => {
                let cancer_related: Vec<bool> = (0..codebook.len())
                    .map(|did| {
                        codebook
                            .label(did as u32)
                            .split_whitespace()
                            .any(|word| word.eq_ignore_ascii_case("neoplasm"))
                    })
                    .collect();
                Box::new(move |t| t.diagnoses.iter().any(|&d| cancer_related[d as usize]))
            }
            "bc" => {
                let bladder_related: Vec<bool> = (0..codebook.len())
                    .map(|did| {
                        let code = codebook.representative_code(did as u32);
                        code.starts_with("C100")
                            || (code.len() >= 3 && BLADDER_CANCER_CODES.contains(&&code[0..3]))
                    })
                    .collect();
                Box::new(move |t| t.diagnoses.iter().any(|&d| bladder_related[d as usize]))
            }
            unknown => {
                return Err(TrajanError::config(format!(
                    "unknown trajectory filter `{unknown}`"
                ))
                .into())
            }
        };
        filters.push(filter);
    }
    Ok(filters)
}
