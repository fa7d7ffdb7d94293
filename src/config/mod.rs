//! Experiment configuration.
//!
//! One struct carries every tunable of the pipeline, mirroring the
//! command-line surface. Validation happens once, up front, so the
//! analysis stages can assume a consistent configuration.

use std::path::PathBuf;

use crate::error::{Result, TrajanError};

/// Number of hierarchy levels in the diagnosis taxonomy.
pub const MAX_HIERARCHY_LEVEL: usize = 6;

/// Configuration for a trajectory analysis experiment.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Name of the run, used as prefix for output files.
    pub name: String,
    /// Path to the patient table.
    pub patient_file: PathBuf,
    /// Path to the diagnosis code taxonomy (ICD-10 XML or CCSR CSV).
    pub diagnosis_info_file: PathBuf,
    /// Path to the per-patient diagnosis events.
    pub diagnoses_file: PathBuf,
    /// Directory under which `<name>/` output files are written.
    pub output_path: PathBuf,

    /// Number of age strata used for cohort matching.
    pub nof_age_groups: usize,
    /// Hierarchy collapse level for diagnosis codes, 0..=6.
    pub level: usize,
    /// Minimum gap between two diagnoses, in fractional years.
    pub min_years: f64,
    /// Maximum gap between two diagnoses, in fractional years.
    pub max_years: f64,
    /// Minimum number of supporting patients per transition.
    pub min_patients: usize,
    /// Minimum trajectory length (number of diagnoses).
    pub min_trajectory_length: usize,
    /// Maximum trajectory length (number of diagnoses).
    pub max_trajectory_length: usize,
    /// Number of Monte-Carlo sampling iterations.
    pub iterations: usize,
    /// Minimum relative risk for a pair to seed trajectories.
    pub min_rr: f64,
    /// Maximum discrete p-value for a pair to seed trajectories.
    pub p_value_threshold: f64,
    /// Seed for the Monte-Carlo random number generators.
    pub random_seed: u64,

    /// Optional ICD-9 to ICD-10 remapping table (JSON).
    pub icd9_to_icd10_file: Option<PathBuf>,
    /// Optional tumor-stage table used by patient filters.
    pub tumor_info_file: Option<PathBuf>,
    /// Optional treatment table injected as synthetic codes.
    pub treatment_info_file: Option<PathBuf>,

    /// Save the RR matrix to this path after estimation.
    pub save_rr: Option<PathBuf>,
    /// Load the RR matrix from this path instead of estimating.
    pub load_rr: Option<PathBuf>,

    /// Patient filter tags, applied in order (AND).
    pub patient_filters: Vec<String>,
    /// Trajectory filter tags, applied at emission (AND).
    pub trajectory_filters: Vec<String>,

    /// Run the MCL clustering stage.
    pub cluster: bool,
    /// MCL inflation values, times ten.
    pub cluster_granularities: Vec<u32>,

    /// Worker threads; 0 means one per hardware thread.
    pub nr_of_threads: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "exp1".to_string(),
            patient_file: PathBuf::new(),
            diagnosis_info_file: PathBuf::new(),
            diagnoses_file: PathBuf::new(),
            output_path: PathBuf::new(),
            nof_age_groups: 6,
            level: 3,
            min_years: 0.5,
            max_years: 5.0,
            min_patients: 1000,
            min_trajectory_length: 3,
            max_trajectory_length: 5,
            iterations: 400,
            min_rr: 1.0,
            p_value_threshold: 0.05,
            random_seed: 0,
            icd9_to_icd10_file: None,
            tumor_info_file: None,
            treatment_info_file: None,
            save_rr: None,
            load_rr: None,
            patient_filters: Vec::new(),
            trajectory_filters: Vec::new(),
            cluster: false,
            cluster_granularities: vec![40, 60, 80, 100],
            nr_of_threads: 0,
        }
    }
}

impl ExperimentConfig {
    /// Check the configuration for inconsistent values.
    ///
    /// # Errors
    /// Returns a [`TrajanError::Config`] describing the first
    /// offending value.
    pub fn validate(&self) -> Result<()> {
        if self.nof_age_groups == 0 {
            return Err(TrajanError::config("nofAgeGroups must be at least 1").into());
        }
        if self.level > MAX_HIERARCHY_LEVEL {
            return Err(TrajanError::config(format!(
                "lvl must be in 0..={MAX_HIERARCHY_LEVEL}, got {}",
                self.level
            ))
            .into());
        }
        if self.min_years > self.max_years {
            return Err(TrajanError::config(format!(
                "minYears ({}) exceeds maxYears ({})",
                self.min_years, self.max_years
            ))
            .into());
        }
        if self.min_trajectory_length < 2 {
            return Err(TrajanError::config("minTrajectoryLength must be at least 2").into());
        }
        if self.min_trajectory_length > self.max_trajectory_length {
            return Err(TrajanError::config(format!(
                "minTrajectoryLength ({}) exceeds maxTrajectoryLength ({})",
                self.min_trajectory_length, self.max_trajectory_length
            ))
            .into());
        }
        if !(0.0..=1.0).contains(&self.p_value_threshold) {
            return Err(TrajanError::config("p-value threshold must lie in [0,1]").into());
        }
        if self.min_rr < 0.0 {
            return Err(TrajanError::config("RR threshold must be non-negative").into());
        }
        if self.cluster && self.cluster_granularities.is_empty() {
            return Err(
                TrajanError::config("clustering requested without granularities").into(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ExperimentConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_year_window() {
        let config = ExperimentConfig {
            min_years: 2.0,
            max_years: 1.0,
            ..ExperimentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_level() {
        let config = ExperimentConfig {
            level: 7,
            ..ExperimentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_length_bounds() {
        let config = ExperimentConfig {
            min_trajectory_length: 6,
            max_trajectory_length: 5,
            ..ExperimentConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
