//! Temporal diagnosis trajectory analysis.
//!
//! This library discovers statistically significant ordered
//! sequences of diagnoses (`D₁ → D₂ → … → Dₖ`) in longitudinal
//! patient records. For every ordered pair of diagnosis codes it
//! estimates a relative risk against a stratum-matched Monte-Carlo
//! counterfactual, chains the significant pairs into bounded,
//! patient-supported trajectories, and emits reports that can
//! optionally be clustered with the external MCL tool chain.

pub mod algorithm;
pub mod cluster;
pub mod config;
pub mod error;
pub mod experiment;
pub mod filters;
pub mod input;
pub mod models;
pub mod output;
pub mod persist;
pub mod utils;

// Core types
pub use config::ExperimentConfig;
pub use error::{Result, ResultExt, TrajanError};
pub use experiment::{run, run_with_stop, Experiment};

// Domain models
pub use models::{Codebook, DiagnosisEvent, Did, Patient, PatientStore, Pid, Sex};

// Analysis surface
pub use algorithm::{
    build_trajectories, estimate_relative_risks, CohortIndex, EstimatorSummary, PairMatrix,
    Trajectory, TrajectoryFilter,
};
