//! GML graph emitters.
//!
//! Trajectories serialize as directed multigraphs: one file merges
//! every trajectory into a single graph, the other writes one graph
//! per trajectory. Nodes are diagnoses with their label, level, and
//! ancestry; edges carry the owning trajectory id, its length, the
//! transition index, the patient support, and the relative risk of
//! the transition.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::algorithm::pairs::PairMatrix;
use crate::algorithm::trajectory::Trajectory;
use crate::error::{Result, ResultExt};
use crate::models::Codebook;

/// Write all trajectories into a single graph.
pub fn write_merged_graph(
    path: &Path,
    trajectories: &[Trajectory],
    pairs: &PairMatrix,
    codebook: &Codebook,
) -> Result<()> {
    let mut out = BufWriter::new(
        File::create(path).with_path_context("cannot create graph file", path)?,
    );
    (|| -> std::io::Result<()> {
        writeln!(out, "graph [\n\tdirected 1\n\tmultigraph 1")?;
        for trajectory in trajectories {
            write_trajectory(&mut out, trajectory, pairs, codebook)?;
        }
        writeln!(out, "]")
    })()
    .with_path_context("cannot write graph file", path)
}

/// Write each trajectory as its own graph in one file.
pub fn write_individual_graphs(
    path: &Path,
    trajectories: &[Trajectory],
    pairs: &PairMatrix,
    codebook: &Codebook,
) -> Result<()> {
    let mut out = BufWriter::new(
        File::create(path).with_path_context("cannot create graph file", path)?,
    );
    (|| -> std::io::Result<()> {
        for trajectory in trajectories {
            writeln!(out, "graph [\n\tdirected 1\n\tmultigraph 1")?;
            write_trajectory(&mut out, trajectory, pairs, codebook)?;
            writeln!(out, "]")?;
        }
        Ok(())
    })()
    .with_path_context("cannot write graph file", path)
}

fn write_trajectory<W: Write>(
    out: &mut W,
    trajectory: &Trajectory,
    pairs: &PairMatrix,
    codebook: &Codebook,
) -> std::io::Result<()> {
    for &did in &trajectory.diagnoses {
        let entry = codebook.entry(did);
        writeln!(out, "\tnode [")?;
        writeln!(out, "\t\tid {did}")?;
        writeln!(out, "\t\tlabel \"{}\"", entry.label)?;
        writeln!(out, "\t\tlevel {}", entry.level)?;
        for (idx, category) in entry.categories.iter().enumerate() {
            writeln!(out, "\t\tcat{idx} \"{category}\"")?;
        }
        writeln!(out, "\t]")?;
    }

    let transitions = trajectory.diagnoses.len() - 1;
    for idx in 0..transitions {
        let source = trajectory.diagnoses[idx];
        let target = trajectory.diagnoses[idx + 1];
        writeln!(out, "\tedge [")?;
        writeln!(out, "\t\ttid {}", trajectory.id)?;
        writeln!(out, "\t\ttlen {transitions}")?;
        writeln!(out, "\t\ttidx {idx}")?;
        writeln!(out, "\t\tsource {source}")?;
        writeln!(out, "\t\ttarget {target}")?;
        writeln!(out, "\t\tpatients {}", trajectory.patient_counts[idx])?;
        writeln!(out, "\t\tRR \"{:.2}\"", pairs.rr(source, target))?;
        writeln!(out, "\t]")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::codebook::CodeEntry;
    use chrono::NaiveDate;

    fn fixture() -> (Codebook, PairMatrix, Vec<Trajectory>) {
        let codes = vec![
            (
                "A00".to_string(),
                CodeEntry {
                    label: "Cholera".to_string(),
                    categories: vec!["Infectious".to_string(), "A00-A09".to_string()],
                    level: 2,
                },
            ),
            (
                "B01".to_string(),
                CodeEntry {
                    label: "Varicella".to_string(),
                    categories: vec!["Infectious".to_string(), "B00-B09".to_string()],
                    level: 2,
                },
            ),
        ];
        let book = Codebook::from_hierarchy(codes, 6, &[]);
        let a = book.resolve("A00")[0];
        let b = book.resolve("B01")[0];
        let mut pairs = PairMatrix::new(book.len());
        pairs.set_rr(a, b, 1.5);
        let trajectory = Trajectory {
            id: 3,
            diagnoses: vec![a, b],
            patient_counts: vec![7],
            cohort: vec![(0, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())],
            cluster: None,
        };
        (book, pairs, vec![trajectory])
    }

    #[test]
    fn merged_graph_wraps_everything_once() {
        let (book, pairs, trajectories) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.gml");
        write_merged_graph(&path, &trajectories, &pairs, &book).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("graph [").count(), 1);
        assert!(text.contains("label \"Cholera\""));
        assert!(text.contains("patients 7"));
        assert!(text.contains("RR \"1.50\""));
        assert!(text.contains("tid 3"));
        assert!(text.ends_with("]\n"));
    }

    #[test]
    fn individual_graphs_wrap_each_trajectory() {
        let (book, pairs, mut trajectories) = fixture();
        let mut second = trajectories[0].clone();
        second.id = 4;
        trajectories.push(second);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.gml");
        write_individual_graphs(&path, &trajectories, &pairs, &book).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("graph [").count(), 2);
    }
}
