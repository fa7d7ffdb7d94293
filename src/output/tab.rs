//! Tab-separated report files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;

use crate::algorithm::pairs::PairMatrix;
use crate::algorithm::trajectory::Trajectory;
use crate::config::ExperimentConfig;
use crate::error::{Result, ResultExt};
use crate::models::Codebook;

/// Write two lines per trajectory: the diagnosis labels in order,
/// then the patient count of each transition.
pub fn write_trajectories(
    path: &Path,
    trajectories: &[Trajectory],
    codebook: &Codebook,
) -> Result<()> {
    let mut out = BufWriter::new(
        File::create(path).with_path_context("cannot create trajectory report", path)?,
    );
    for trajectory in trajectories {
        let labels = trajectory
            .diagnoses
            .iter()
            .map(|&did| codebook.label(did))
            .join("\t");
        writeln!(out, "{labels}").with_path_context("cannot write trajectory report", path)?;
        let counts = trajectory.patient_counts.iter().join("\t");
        writeln!(out, "{counts}").with_path_context("cannot write trajectory report", path)?;
    }
    Ok(())
}

/// Write one line per significant pair: both labels and the
/// relative risk.
pub fn write_pairs(
    path: &Path,
    pairs: &PairMatrix,
    config: &ExperimentConfig,
    codebook: &Codebook,
) -> Result<()> {
    let mut out = BufWriter::new(
        File::create(path).with_path_context("cannot create pair report", path)?,
    );
    for (a, b) in pairs.significant_pairs(
        config.min_rr,
        config.min_patients,
        config.p_value_threshold,
    ) {
        writeln!(
            out,
            "{}\t{}\t{:E}",
            codebook.label(a),
            codebook.label(b),
            pairs.rr(a, b)
        )
        .with_path_context("cannot write pair report", path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::codebook::CodeEntry;
    use chrono::NaiveDate;

    fn codebook() -> Codebook {
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
        Codebook::from_hierarchy(codes, 6, &[])
    }

    #[test]
    fn trajectory_report_has_two_lines_per_trajectory() {
        let book = codebook();
        let a = book.resolve("A00")[0];
        let b = book.resolve("B01")[0];
        let trajectory = Trajectory {
            id: 0,
            diagnoses: vec![a, b],
            patient_counts: vec![42],
            cohort: vec![(0, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())],
            cluster: None,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tab");
        write_trajectories(&path, &[trajectory], &book).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Cholera\tVaricella\n42\n");
    }

    #[test]
    fn pair_report_lists_significant_pairs_with_rr() {
        let book = codebook();
        let a = book.resolve("A00")[0];
        let b = book.resolve("B01")[0];
        let mut pairs = PairMatrix::new(book.len());
        pairs.set_rr(a, b, 2.0);
        pairs.set_p_value(a, b, 0.0);
        pairs.set_support(a, b, vec![0, 1]);

        let config = ExperimentConfig {
            min_patients: 2,
            ..ExperimentConfig::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.tab");
        write_pairs(&path, &pairs, &config, &book).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Cholera\tVaricella\t2E0\n");
    }
}
