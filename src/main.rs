//! Command-line front end for the trajectory analysis pipeline.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use trajan::{ExperimentConfig, TrajanError};

/// Discover temporal diagnosis trajectories in patient records.
#[derive(Parser)]
#[command(name = "trajan", version, about)]
struct Opt {
    /// Patient table (CSV, no header).
    patient_file: PathBuf,
    /// Diagnosis taxonomy: ICD-10 hierarchy XML or CCSR CSV.
    diagnosis_info_file: PathBuf,
    /// Per-patient diagnosis events (CSV).
    diagnoses_file: PathBuf,
    /// Directory under which `<name>/` output files are written.
    output_path: PathBuf,

    /// Number of age strata for cohort matching.
    #[arg(long = "nofAgeGroups", default_value_t = 6)]
    nof_age_groups: usize,
    /// Hierarchy collapse level for diagnosis codes (0-6).
    #[arg(long = "lvl", default_value_t = 3)]
    level: usize,
    /// Minimum years between two diagnoses of a pair.
    #[arg(long = "minYears", default_value_t = 0.5)]
    min_years: f64,
    /// Maximum years between two diagnoses of a pair.
    #[arg(long = "maxYears", default_value_t = 5.0)]
    max_years: f64,
    /// Minimum number of supporting patients per transition.
    #[arg(long = "minPatients", default_value_t = 1000)]
    min_patients: usize,
    /// Minimum trajectory length.
    #[arg(long = "minTrajectoryLength", default_value_t = 3)]
    min_trajectory_length: usize,
    /// Maximum trajectory length.
    #[arg(long = "maxTrajectoryLength", default_value_t = 5)]
    max_trajectory_length: usize,
    /// Monte-Carlo sampling iterations.
    #[arg(long = "iter", default_value_t = 400)]
    iterations: usize,
    /// Minimum relative risk for significant pairs.
    #[arg(long = "RR", default_value_t = 1.0)]
    min_rr: f64,
    /// Seed for the Monte-Carlo random number generators.
    #[arg(long = "seed", default_value_t = 0)]
    random_seed: u64,
    /// Experiment name; prefixes the output files.
    #[arg(long = "name", default_value = "exp1")]
    name: String,

    /// JSON table remapping ICD-9 codes to ICD-10.
    #[arg(long = "ICD9ToICD10File")]
    icd9_to_icd10_file: Option<PathBuf>,
    /// Tumor-stage table used by the stage filters.
    #[arg(long = "tumorInfo")]
    tumor_info_file: Option<PathBuf>,
    /// Treatment table injected as synthetic diagnosis codes.
    #[arg(long = "treatmentInfo")]
    treatment_info_file: Option<PathBuf>,

    /// Save the RR matrix for later runs.
    #[arg(long = "saveRR")]
    save_rr: Option<PathBuf>,
    /// Load the RR matrix from an earlier run instead of
    /// recomputing it.
    #[arg(long = "loadRR")]
    load_rr: Option<PathBuf>,

    /// Comma-separated patient filter tags.
    #[arg(long = "pfilters", value_delimiter = ',', default_value = "id")]
    patient_filters: Vec<String>,
    /// Comma-separated trajectory filter tags.
    #[arg(long = "tfilters", value_delimiter = ',', default_value = "id")]
    trajectory_filters: Vec<String>,

    /// Cluster the trajectories with the external MCL tools.
    #[arg(long = "cluster")]
    cluster: bool,
    /// MCL inflation values, times ten.
    #[arg(
        long = "clusterGranularities",
        value_delimiter = ',',
        default_value = "40,60,80,100"
    )]
    cluster_granularities: Vec<u32>,

    /// Worker threads (0 = one per hardware thread).
    #[arg(long = "nrOfThreads", default_value_t = 0)]
    nr_of_threads: usize,
}

impl From<Opt> for ExperimentConfig {
    fn from(opt: Opt) -> Self {
        Self {
            name: opt.name,
            patient_file: opt.patient_file,
            diagnosis_info_file: opt.diagnosis_info_file,
            diagnoses_file: opt.diagnoses_file,
            output_path: opt.output_path,
            nof_age_groups: opt.nof_age_groups,
            level: opt.level,
            min_years: opt.min_years,
            max_years: opt.max_years,
            min_patients: opt.min_patients,
            min_trajectory_length: opt.min_trajectory_length,
            max_trajectory_length: opt.max_trajectory_length,
            iterations: opt.iterations,
            min_rr: opt.min_rr,
            random_seed: opt.random_seed,
            icd9_to_icd10_file: opt.icd9_to_icd10_file,
            tumor_info_file: opt.tumor_info_file,
            treatment_info_file: opt.treatment_info_file,
            save_rr: opt.save_rr,
            load_rr: opt.load_rr,
            patient_filters: opt.patient_filters,
            trajectory_filters: opt.trajectory_filters,
            cluster: opt.cluster,
            cluster_granularities: opt.cluster_granularities,
            nr_of_threads: opt.nr_of_threads,
            ..Self::default()
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // argument problems exit 1; code 2 is reserved for estimator
    // failures
    let opt = match Opt::try_parse() {
        Ok(opt) => opt,
        Err(error) => {
            let code = if error.use_stderr() { 1 } else { 0 };
            let _ = error.print();
            return ExitCode::from(code);
        }
    };
    match trajan::run(opt.into()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            let code = match error.downcast_ref::<TrajanError>() {
                Some(TrajanError::Estimator(_)) => 2,
                _ => 1,
            };
            ExitCode::from(code)
        }
    }
}
