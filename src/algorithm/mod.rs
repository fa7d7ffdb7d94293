//! Analysis algorithms: cohort stratification, pair statistics,
//! relative-risk estimation, and trajectory construction.

pub mod cohort;
pub mod estimator;
pub mod pairs;
pub mod trajectory;

pub use cohort::CohortIndex;
pub use estimator::{estimate_relative_risks, EstimatorSummary};
pub use pairs::PairMatrix;
pub use trajectory::{build_trajectories, Trajectory, TrajectoryFilter};
