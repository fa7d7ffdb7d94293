//! Cluster-annotated reports.
//!
//! After the clustering stage has assigned every trajectory a
//! cluster, these emitters write a per-cluster trajectory listing
//! with simple cohort demographics, plus two CSV files relating
//! patients, clusters, and trajectories.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Datelike;
use itertools::Itertools;
use rustc_hash::FxHashSet;

use crate::algorithm::trajectory::Trajectory;
use crate::error::{Result, ResultExt};
use crate::models::{Codebook, PatientStore, Sex};

/// Cohort demographics of one cluster.
#[derive(Debug, Default)]
struct ClusterMetrics {
    mean_age: f64,
    stdev_age: f64,
    mean_age_eoi: f64,
    stdev_age_eoi: f64,
    males: usize,
    females: usize,
}

fn metrics(trajectories: &[&Trajectory], store: &PatientStore) -> ClusterMetrics {
    let mut ages: Vec<f64> = Vec::new();
    let mut eoi_ages: Vec<f64> = Vec::new();
    let mut males = 0usize;
    let mut females = 0usize;
    for trajectory in trajectories {
        for &(pid, last_date) in &trajectory.cohort {
            let patient = store.get(pid);
            ages.push(f64::from(last_date.year() - patient.year_of_birth));
            if let Some(eoi) = patient.eoi_date {
                eoi_ages.push(f64::from(eoi.year() - patient.year_of_birth));
            }
            match patient.sex {
                Sex::Male => males += 1,
                Sex::Female => females += 1,
            }
        }
    }
    let (mean_age, stdev_age) = mean_and_stdev(&ages);
    let (mean_age_eoi, stdev_age_eoi) = mean_and_stdev(&eoi_ages);
    ClusterMetrics {
        mean_age,
        stdev_age,
        mean_age_eoi,
        stdev_age_eoi,
        males,
        females,
    }
}

fn mean_and_stdev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}

/// Write the per-cluster trajectory listing.
///
/// Every cluster gets a header line with its demographics, then
/// three lines per member trajectory: ids, labels, and transition
/// supports.
pub fn write_clustered_trajectories(
    path: &Path,
    trajectories: &[Trajectory],
    store: &PatientStore,
    codebook: &Codebook,
) -> Result<()> {
    let mut clusters: BTreeMap<usize, Vec<&Trajectory>> = BTreeMap::new();
    for trajectory in trajectories {
        clusters
            .entry(trajectory.cluster.unwrap_or(0))
            .or_default()
            .push(trajectory);
    }

    let mut out = BufWriter::new(
        File::create(path).with_path_context("cannot create cluster report", path)?,
    );
    (|| -> std::io::Result<()> {
        for (cid, members) in &clusters {
            let m = metrics(members, store);
            writeln!(
                out,
                "CID:\t{cid}\tMean Age:\t{:.2}\tStdev:\t{:.2}\tMean Age EOI:\t{:.2}\tStdev:\t{:.2}\tMales:\t{}\tFemales:\t{}\tTrajectories:\t{}",
                m.mean_age, m.stdev_age, m.mean_age_eoi, m.stdev_age_eoi, m.males, m.females,
                members.len()
            )?;
            for trajectory in members {
                writeln!(out, "CID:\t{cid}\tTID:\t{}", trajectory.id)?;
                let labels = trajectory
                    .diagnoses
                    .iter()
                    .map(|&did| codebook.label(did))
                    .join("\t");
                writeln!(out, "{labels}")?;
                writeln!(out, "{}", trajectory.patient_counts.iter().join("\t"))?;
            }
        }
        Ok(())
    })()
    .with_path_context("cannot write cluster report", path)
}

/// Write the patient and cluster CSV files.
///
/// The patient file lists every patient appearing in a final
/// transition (`PID,AgeEOI,Sex,PIDString`); patients without an
/// event of interest get age -1. The cluster file relates patients
/// to trajectories (`PID,CID,TID,Age`) with the age at the final
/// diagnosis.
pub fn write_cluster_csvs(
    patients_path: &Path,
    clusters_path: &Path,
    trajectories: &[Trajectory],
    store: &PatientStore,
) -> Result<()> {
    let mut out = BufWriter::new(
        File::create(patients_path)
            .with_path_context("cannot create patient CSV", patients_path)?,
    );
    (|| -> std::io::Result<()> {
        writeln!(out, "PID,AgeEOI,Sex,PIDString")?;
        let mut seen: FxHashSet<u32> = FxHashSet::default();
        for trajectory in trajectories {
            for &(pid, _) in &trajectory.cohort {
                if !seen.insert(pid) {
                    continue;
                }
                let patient = store.get(pid);
                let age_eoi = patient
                    .eoi_date
                    .map_or(-1, |eoi| eoi.year() - patient.year_of_birth);
                writeln!(
                    out,
                    "{pid},{age_eoi},{},{}",
                    patient.sex.as_str(),
                    patient.external_id
                )?;
            }
        }
        Ok(())
    })()
    .with_path_context("cannot write patient CSV", patients_path)?;

    let mut out = BufWriter::new(
        File::create(clusters_path)
            .with_path_context("cannot create cluster CSV", clusters_path)?,
    );
    (|| -> std::io::Result<()> {
        writeln!(out, "PID,CID,TID,Age")?;
        for trajectory in trajectories {
            let cid = trajectory.cluster.unwrap_or(0);
            for &(pid, last_date) in &trajectory.cohort {
                let patient = store.get(pid);
                let age = last_date.year() - patient.year_of_birth;
                writeln!(out, "{pid},{cid},{},{age}", trajectory.id)?;
            }
        }
        Ok(())
    })()
    .with_path_context("cannot write cluster CSV", clusters_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::codebook::CodeEntry;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixture() -> (Codebook, PatientStore, Vec<Trajectory>) {
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
        let mut store = PatientStore::new();
        let p0 = store.insert("x1".into(), 1950, Sex::Male, 0, None);
        let p1 = store.insert("x2".into(), 1960, Sex::Female, 0, None);
        store.get_mut(p1).eoi_date = Some(date(2015, 1, 1));
        let a = book.resolve("A00")[0];
        let b = book.resolve("B01")[0];
        let trajectory = Trajectory {
            id: 0,
            diagnoses: vec![a, b],
            patient_counts: vec![2],
            cohort: vec![(p0, date(2020, 1, 1)), (p1, date(2021, 1, 1))],
            cluster: Some(1),
        };
        (book, store, vec![trajectory])
    }

    #[test]
    fn cluster_listing_groups_by_cluster() {
        let (book, store, trajectories) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.tab");
        write_clustered_trajectories(&path, &trajectories, &store, &book).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("CID:\t1\tMean Age:"));
        assert!(text.contains("CID:\t1\tTID:\t0"));
        assert!(text.contains("Cholera\tVaricella"));
        assert!(text.contains("Males:\t1\tFemales:\t1"));
    }

    #[test]
    fn csv_files_relate_patients_and_trajectories() {
        let (_, store, trajectories) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let patients_path = dir.path().join("patients.csv");
        let clusters_path = dir.path().join("clusters.csv");
        write_cluster_csvs(&patients_path, &clusters_path, &trajectories, &store).unwrap();

        let patients = std::fs::read_to_string(&patients_path).unwrap();
        let mut lines = patients.lines();
        assert_eq!(lines.next(), Some("PID,AgeEOI,Sex,PIDString"));
        assert_eq!(lines.next(), Some("0,-1,M,x1"));
        assert_eq!(lines.next(), Some("1,55,F,x2"));

        let clusters = std::fs::read_to_string(&clusters_path).unwrap();
        let mut lines = clusters.lines();
        assert_eq!(lines.next(), Some("PID,CID,TID,Age"));
        assert_eq!(lines.next(), Some("0,1,0,70"));
        assert_eq!(lines.next(), Some("1,1,0,61"));
    }
}
