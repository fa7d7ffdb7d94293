//! Experiment orchestration.
//!
//! Wires the stages together: parse the inputs, stratify the
//! cohort, estimate or load the pair statistics, build the
//! trajectories, and emit the reports. Each stage logs a short
//! summary as it completes.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::bail;
use log::info;

use crate::algorithm::cohort::CohortIndex;
use crate::algorithm::estimator::{estimate_relative_risks, EstimatorSummary};
use crate::algorithm::pairs::PairMatrix;
use crate::algorithm::trajectory::{build_trajectories, Trajectory};
use crate::cluster::cluster_trajectories;
use crate::config::ExperimentConfig;
use crate::error::{Result, ResultExt, TrajanError};
use crate::filters::{patient_filters_from_tags, trajectory_filters_from_tags};
use crate::input;
use crate::input::tumor::TumorMap;
use crate::models::{Codebook, PatientStore};
use crate::output;
use crate::persist;

/// The completed state of a run, kept for inspection and tests.
#[derive(Debug)]
pub struct Experiment {
    pub config: ExperimentConfig,
    pub codebook: Codebook,
    pub store: PatientStore,
    pub pairs: PairMatrix,
    pub trajectories: Vec<Trajectory>,
    pub estimator_summary: Option<EstimatorSummary>,
}

/// Run a full experiment.
///
/// # Errors
/// Input and configuration problems fail the run before analysis;
/// estimator failures carry their own error class so the command
/// line can distinguish them.
pub fn run(config: ExperimentConfig) -> Result<Experiment> {
    run_with_stop(config, &AtomicBool::new(false))
}

/// Like [`run`], but checks a cooperative stop flag between stages
/// and aborts cleanly once it is raised.
///
/// # Errors
/// See [`run`]; additionally fails when the stop flag is raised.
pub fn run_with_stop(config: ExperimentConfig, stop: &AtomicBool) -> Result<Experiment> {
    config.validate()?;

    let output_dir = config.output_path.join(&config.name);
    fs::create_dir_all(&output_dir)
        .with_path_context("cannot create output directory", &output_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.nr_of_threads)
        .build()
        .map_err(|e| TrajanError::config(format!("cannot build worker pool: {e}")))?;
    pool.install(|| run_inner(config, &output_dir, stop))
}

fn check_stop(stop: &AtomicBool, next_stage: &str) -> Result<()> {
    if stop.load(Ordering::Relaxed) {
        bail!("stopped before {next_stage}");
    }
    Ok(())
}

fn run_inner(config: ExperimentConfig, output_dir: &Path, stop: &AtomicBool) -> Result<Experiment> {
    // 1. inputs
    let tumor_info: Arc<TumorMap> = Arc::new(match &config.tumor_info_file {
        Some(path) => input::parse_tumor_table(path)?,
        None => TumorMap::default(),
    });
    let patient_filters = patient_filters_from_tags(&config.patient_filters, &tumor_info)?;

    let codebook = build_codebook(&config)?;
    let mut store = input::parse_patient_table(&config.patient_file)?;

    let icd9_to_icd10 = match &config.icd9_to_icd10_file {
        Some(path) => input::parse_icd9_to_icd10(path)?,
        None => Default::default(),
    };
    input::parse_diagnosis_events(
        &config.diagnoses_file,
        &mut store,
        &codebook,
        &icd9_to_icd10,
    )?;
    if let Some(path) = &config.treatment_info_file {
        let treatments = input::parse_treatment_table(path)?;
        input::inject_treatment_codes(&mut store, &codebook, &treatments);
    }
    store.canonicalize();

    let mut store = store.retain_filtered(|patient| {
        patient_filters.iter().all(|filter| filter(patient))
    });
    info!("Filtered down to {} patients", store.len());

    // 2. cohort strata
    check_stop(stop, "cohort stratification")?;
    let cohort = CohortIndex::build(&mut store, config.nof_age_groups);

    // 3. pair statistics: estimate, or resume from file
    let d = codebook.len();
    let fingerprint = codebook.fingerprint();
    let (pairs, estimator_summary) = match &config.load_rr {
        Some(path) => (persist::load_rr(path, d, fingerprint)?, None),
        None => {
            let (pairs, summary) = estimate_relative_risks(&store, &cohort, d, &config)?;
            (pairs, Some(summary))
        }
    };
    if let Some(path) = &config.save_rr {
        persist::save_rr(path, &pairs, fingerprint)?;
    }

    // 4. trajectories
    check_stop(stop, "trajectory construction")?;
    let trajectory_filters = trajectory_filters_from_tags(&config.trajectory_filters, &codebook)?;
    let mut trajectories = build_trajectories(&store, &pairs, &config, &trajectory_filters);

    // 5. reports
    output::write_outputs(
        output_dir,
        &config.name,
        &trajectories,
        &pairs,
        &config,
        &codebook,
    )?;
    info!("Collected trajectories:");
    for trajectory in trajectories.iter().take(100) {
        info!("{}", format_trajectory(trajectory, &codebook));
    }

    // 6. clustering
    check_stop(stop, "clustering")?;
    if config.cluster {
        cluster_trajectories(
            &mut trajectories,
            output_dir,
            &config.name,
            &config.cluster_granularities,
        )?;
        output::cluster_report::write_clustered_trajectories(
            &output_dir.join(format!("{}-trajectories-clustered.tab", config.name)),
            &trajectories,
            &store,
            &codebook,
        )?;
        output::cluster_report::write_cluster_csvs(
            &output_dir.join(format!("{}-cluster-patients.csv", config.name)),
            &output_dir.join(format!("{}-cluster-assignments.csv", config.name)),
            &trajectories,
            &store,
        )?;
    }

    Ok(Experiment {
        config,
        codebook,
        store,
        pairs,
        trajectories,
        estimator_summary,
    })
}

/// Choose the codebook construction mode from the taxonomy file
/// extension: XML means hierarchy collapse, CSV means the category
/// table.
fn build_codebook(config: &ExperimentConfig) -> Result<Codebook> {
    let path = &config.diagnosis_info_file;
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("xml") => {
            let codes = input::parse_hierarchy(path)?;
            Ok(Codebook::from_hierarchy(
                codes,
                config.level,
                &crate::models::codebook::default_excluded_chapters(),
            ))
        }
        Some("csv") => {
            let rows = input::ccsr::parse_ccsr_table(path)?;
            Ok(Codebook::from_categories(rows))
        }
        _ => Err(TrajanError::input_at(
            "unrecognized taxonomy format (expected .xml or .csv)",
            path,
        )
        .into()),
    }
}

/// Human-readable one-line rendering, used for the run log.
#[must_use]
pub fn format_trajectory(trajectory: &Trajectory, codebook: &Codebook) -> String {
    let mut text = String::new();
    for (idx, &did) in trajectory.diagnoses.iter().enumerate() {
        text.push_str(codebook.label(did));
        if idx < trajectory.patient_counts.len() {
            text.push_str(&format!(" -- {} --> ", trajectory.patient_counts[idx]));
        }
    }
    text
}
