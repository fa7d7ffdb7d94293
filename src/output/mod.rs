//! Output emitters for trajectories, pairs, and cluster reports.

pub mod cluster_report;
pub mod gml;
pub mod tab;

use std::path::{Path, PathBuf};

use crate::algorithm::pairs::PairMatrix;
use crate::algorithm::trajectory::Trajectory;
use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::models::Codebook;

/// Write the standard output files under `dir`.
///
/// Produces `<name>-trajectories.tab`, `<name>-pairs.tab`,
/// `<name>-trajectories-merged-graph.gml`, and
/// `<name>-trajectories-individual-graphs.gml`.
///
/// # Errors
/// Fails on I/O errors.
pub fn write_outputs(
    dir: &Path,
    name: &str,
    trajectories: &[Trajectory],
    pairs: &PairMatrix,
    config: &ExperimentConfig,
    codebook: &Codebook,
) -> Result<()> {
    tab::write_trajectories(
        &prefixed(dir, name, "trajectories.tab"),
        trajectories,
        codebook,
    )?;
    tab::write_pairs(&prefixed(dir, name, "pairs.tab"), pairs, config, codebook)?;
    gml::write_merged_graph(
        &prefixed(dir, name, "trajectories-merged-graph.gml"),
        trajectories,
        pairs,
        codebook,
    )?;
    gml::write_individual_graphs(
        &prefixed(dir, name, "trajectories-individual-graphs.gml"),
        trajectories,
        pairs,
        codebook,
    )?;
    Ok(())
}

fn prefixed(dir: &Path, name: &str, suffix: &str) -> PathBuf {
    dir.join(format!("{name}-{suffix}"))
}
