//! MCL clustering stage.
//!
//! The trajectories induce a weighted directed graph over diagnoses:
//! every transition that appears in an emitted trajectory becomes an
//! edge whose weight is the largest patient support observed for it.
//! The graph is streamed to the external MCL tool chain (`mcxload`,
//! `mcl`, `mcxdump`) once per configured granularity, and the
//! resulting node clusters annotate the trajectories: a trajectory
//! joins the cluster holding the plurality of its diagnoses, the
//! cluster of its first diagnosis breaking ties.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use log::info;
use rustc_hash::FxHashMap;

use crate::algorithm::trajectory::Trajectory;
use crate::error::{Result, ResultExt, TrajanError};
use crate::models::Did;

/// Run the clustering stage and annotate the trajectories.
///
/// Cluster assignment files are written as `clusters.I<g>` under
/// `dir`; the annotation uses the first granularity in the list.
///
/// # Errors
/// External-tool failures (missing binary, non-zero exit) are
/// wrapped with the captured stderr.
pub fn cluster_trajectories(
    trajectories: &mut [Trajectory],
    dir: &Path,
    name: &str,
    granularities: &[u32],
) -> Result<()> {
    let abc_path = dir.join(format!("{name}.abc"));
    let tab_path = dir.join(format!("{name}.tab"));
    let mci_path = dir.join(format!("{name}.mci"));
    write_abc_file(&abc_path, trajectories)?;

    mcxload(&abc_path, &tab_path, &mci_path)?;
    for &granularity in granularities {
        let cluster_path = cluster_file(&mci_path, granularity);
        mcl(&mci_path, &cluster_path, granularity)?;
        mcxdump(
            &cluster_path,
            &tab_path,
            &dir.join(format!("clusters.I{granularity}")),
        )?;
    }

    let first = granularities[0];
    let assignments = read_cluster_assignments(&dir.join(format!("clusters.I{first}")))?;
    annotate(trajectories, &assignments);
    info!(
        "Clustered {} trajectories into {} clusters at granularity {first}",
        trajectories.len(),
        assignments.values().max().map_or(0, |&c| c + 1)
    );
    Ok(())
}

/// Write the weighted edge list consumed by `mcxload`.
fn write_abc_file(path: &Path, trajectories: &[Trajectory]) -> Result<()> {
    let mut weights: FxHashMap<(Did, Did), u32> = FxHashMap::default();
    for trajectory in trajectories {
        for (idx, window) in trajectory.diagnoses.windows(2).enumerate() {
            let weight = trajectory.patient_counts[idx];
            let entry = weights.entry((window[0], window[1])).or_insert(0);
            *entry = (*entry).max(weight);
        }
    }
    let mut edges: Vec<((Did, Did), u32)> = weights.into_iter().collect();
    edges.sort_unstable();

    let mut out = BufWriter::new(
        File::create(path).with_path_context("cannot create abc edge file", path)?,
    );
    for ((source, target), weight) in edges {
        writeln!(out, "D{source}\tD{target}\t{weight}")
            .with_path_context("cannot write abc edge file", path)?;
    }
    Ok(())
}

fn cluster_file(mci_path: &Path, granularity: u32) -> PathBuf {
    let mut name = mci_path.as_os_str().to_os_string();
    name.push(format!(".I{granularity}"));
    PathBuf::from(name)
}

fn mcxload(abc_path: &Path, tab_path: &Path, mci_path: &Path) -> Result<()> {
    run_tool(Command::new("mcxload").args([
        "-abc".as_ref(),
        abc_path.as_os_str(),
        "--stream-mirror".as_ref(),
        "-write-tab".as_ref(),
        tab_path.as_os_str(),
        "-o".as_ref(),
        mci_path.as_os_str(),
    ]))
}

fn mcl(mci_path: &Path, cluster_path: &Path, granularity: u32) -> Result<()> {
    let inflation = format!("{:.1}", f64::from(granularity) / 10.0);
    run_tool(Command::new("mcl").args([
        mci_path.as_os_str(),
        "-I".as_ref(),
        inflation.as_ref(),
        "-o".as_ref(),
        cluster_path.as_os_str(),
    ]))
}

fn mcxdump(cluster_path: &Path, tab_path: &Path, out_path: &Path) -> Result<()> {
    run_tool(Command::new("mcxdump").args([
        "-icl".as_ref(),
        cluster_path.as_os_str(),
        "-tabr".as_ref(),
        tab_path.as_os_str(),
        "-o".as_ref(),
        out_path.as_os_str(),
    ]))
}

/// Run one external tool, capturing its output.
fn run_tool(command: &mut Command) -> Result<()> {
    let tool = command
        .get_program()
        .to_string_lossy()
        .into_owned();
    let output = command.output().map_err(|e| {
        TrajanError::external_tool(&tool, format!("cannot launch binary: {e}"))
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        };
        return Err(TrajanError::external_tool(&tool, message).into());
    }
    Ok(())
}

/// Parse a `mcxdump` cluster file: one cluster per line, node names
/// separated by tabs.
fn read_cluster_assignments(path: &Path) -> Result<FxHashMap<Did, usize>> {
    let text =
        std::fs::read_to_string(path).with_path_context("cannot read cluster file", path)?;
    let mut assignments = FxHashMap::default();
    for (cluster, line) in text.lines().enumerate() {
        for node in line.split('\t').filter(|n| !n.is_empty()) {
            let did: Did = node
                .strip_prefix('D')
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| {
                    TrajanError::input_at(format!("unexpected cluster node `{node}`"), path)
                })?;
            assignments.insert(did, cluster);
        }
    }
    Ok(assignments)
}

/// Assign every trajectory the cluster holding the plurality of its
/// diagnoses; ties go to the cluster of the earliest diagnosis.
fn annotate(trajectories: &mut [Trajectory], assignments: &FxHashMap<Did, usize>) {
    for trajectory in trajectories {
        let mut votes: FxHashMap<usize, usize> = FxHashMap::default();
        for did in &trajectory.diagnoses {
            if let Some(&cluster) = assignments.get(did) {
                *votes.entry(cluster).or_insert(0) += 1;
            }
        }
        let mut best: Option<usize> = None;
        let mut best_votes = 0usize;
        for did in &trajectory.diagnoses {
            if let Some(&cluster) = assignments.get(did) {
                let count = votes[&cluster];
                if count > best_votes {
                    best = Some(cluster);
                    best_votes = count;
                }
            }
        }
        trajectory.cluster = Some(best.unwrap_or(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write as _;

    fn trajectory(id: usize, dids: &[Did], counts: &[u32]) -> Trajectory {
        Trajectory {
            id,
            diagnoses: dids.to_vec(),
            patient_counts: counts.to_vec(),
            cohort: vec![(0, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())],
            cluster: None,
        }
    }

    #[test]
    fn abc_file_takes_the_heaviest_support_per_edge() {
        let trajectories = vec![
            trajectory(0, &[0, 1], &[10]),
            trajectory(1, &[0, 1, 2], &[25, 5]),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.abc");
        write_abc_file(&path, &trajectories).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "D0\tD1\t25\nD1\tD2\t5\n");
    }

    #[test]
    fn cluster_assignments_parse_and_annotate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "D0\tD1").unwrap();
        writeln!(file, "D2").unwrap();
        let assignments = read_cluster_assignments(file.path()).unwrap();
        assert_eq!(assignments[&0], 0);
        assert_eq!(assignments[&2], 1);

        let mut trajectories = vec![
            trajectory(0, &[0, 1], &[10]),
            trajectory(1, &[0, 2], &[10]),
            trajectory(2, &[2, 0, 1], &[10, 10]),
        ];
        annotate(&mut trajectories, &assignments);
        assert_eq!(trajectories[0].cluster, Some(0));
        // tie between clusters 0 and 1 goes to the first diagnosis
        assert_eq!(trajectories[1].cluster, Some(0));
        assert_eq!(trajectories[2].cluster, Some(0));
    }

    #[test]
    fn missing_binary_is_an_external_tool_error() {
        let error = run_tool(&mut Command::new("definitely-not-a-real-mcl-binary")).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<TrajanError>(),
            Some(TrajanError::ExternalTool { .. })
        ));
    }
}
