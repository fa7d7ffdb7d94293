//! Trajectory construction.
//!
//! Significant ordered pairs seed length-two trajectories, which a
//! bounded breadth-first expansion grows one diagnosis at a time.
//! A trajectory carries its patient cohort through the expansion:
//! extending `d₁…dₖ` with `dₖ₊₁` keeps exactly the patients that
//! support the prefix, also witness `dₖ → dₖ₊₁`, and whose first
//! `dₖ₊₁` falls strictly after the date at which they matched `dₖ`.
//! Prefixes shorter than the minimum length keep extending but are
//! not emitted. Emission order is lexicographic over the diagnosis
//! sequence, making output independent of worker scheduling and
//! patient order.

use std::collections::VecDeque;

use chrono::NaiveDate;
use log::info;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::algorithm::pairs::PairMatrix;
use crate::config::ExperimentConfig;
use crate::models::{Did, PatientStore, Pid};

/// An ordered diagnosis sequence with its transition supports.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Identifier assigned after the global sort.
    pub id: usize,
    /// Diagnosis sequence, length within the configured bounds.
    pub diagnoses: Vec<Did>,
    /// Patients supporting each transition at the time it was added;
    /// one entry per consecutive pair.
    pub patient_counts: Vec<u32>,
    /// Patients supporting the complete sequence, with the date of
    /// their final diagnosis. Ascending by pid.
    pub cohort: Vec<(Pid, NaiveDate)>,
    /// Cluster assigned by the clustering stage, if it ran.
    pub cluster: Option<usize>,
}

/// Predicate deciding whether a finished trajectory is emitted.
/// Multiple filters compose by logical AND.
pub type TrajectoryFilter = Box<dyn Fn(&Trajectory) -> bool + Send + Sync>;

/// Expansion state: a prefix plus the cohort supporting it.
struct Prefix {
    diagnoses: Vec<Did>,
    patient_counts: Vec<u32>,
    cohort: Vec<(Pid, NaiveDate)>,
}

/// Build all trajectories from the significance-filtered pair set.
#[must_use]
pub fn build_trajectories(
    store: &PatientStore,
    pairs: &PairMatrix,
    config: &ExperimentConfig,
    filters: &[TrajectoryFilter],
) -> Vec<Trajectory> {
    info!("Selecting diagnosis pairs for building trajectories...");
    let seeds = pairs.significant_pairs(
        config.min_rr,
        config.min_patients,
        config.p_value_threshold,
    );
    info!("Found {} suitable diagnosis pairs", seeds.len());

    // successors per diagnosis, ascending, for the extension step
    let mut successors: FxHashMap<Did, Vec<Did>> = FxHashMap::default();
    for &(a, b) in &seeds {
        successors.entry(a).or_default().push(b);
    }

    let dates = FirstDateIndex::build(store);

    let mut trajectories: Vec<Trajectory> = seeds
        .par_iter()
        .map(|&(a, b)| expand_seed(a, b, pairs, &successors, &dates, config, filters))
        .reduce(Vec::new, |mut acc, mut more| {
            acc.append(&mut more);
            acc
        });

    trajectories.sort_by(|x, y| x.diagnoses.cmp(&y.diagnoses));
    for (id, trajectory) in trajectories.iter_mut().enumerate() {
        trajectory.id = id;
    }
    info!("Found {} trajectories", trajectories.len());
    trajectories
}

fn expand_seed(
    a: Did,
    b: Did,
    pairs: &PairMatrix,
    successors: &FxHashMap<Did, Vec<Did>>,
    dates: &FirstDateIndex,
    config: &ExperimentConfig,
    filters: &[TrajectoryFilter],
) -> Vec<Trajectory> {
    let seed_cohort: Vec<(Pid, NaiveDate)> = pairs
        .support(a, b)
        .iter()
        .map(|&pid| (pid, dates.first_date(pid, b)))
        .collect();

    let mut out = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(Prefix {
        diagnoses: vec![a, b],
        patient_counts: vec![seed_cohort.len() as u32],
        cohort: seed_cohort,
    });

    while let Some(prefix) = queue.pop_front() {
        if prefix.diagnoses.len() < config.max_trajectory_length {
            let last = *prefix.diagnoses.last().expect("prefix is never empty");
            if let Some(candidates) = successors.get(&last) {
                for &next in candidates {
                    if prefix.diagnoses.contains(&next) {
                        continue;
                    }
                    let extended = continuation_cohort(
                        &prefix.cohort,
                        pairs.support(last, next),
                        next,
                        dates,
                    );
                    if extended.len() < config.min_patients {
                        continue;
                    }
                    let mut diagnoses = prefix.diagnoses.clone();
                    diagnoses.push(next);
                    let mut patient_counts = prefix.patient_counts.clone();
                    patient_counts.push(extended.len() as u32);
                    queue.push_back(Prefix {
                        diagnoses,
                        patient_counts,
                        cohort: extended,
                    });
                }
            }
        }

        if prefix.diagnoses.len() >= config.min_trajectory_length {
            let trajectory = Trajectory {
                id: 0,
                diagnoses: prefix.diagnoses,
                patient_counts: prefix.patient_counts,
                cohort: prefix.cohort,
                cluster: None,
            };
            if filters.iter().all(|f| f(&trajectory)) {
                out.push(trajectory);
            }
        }
    }
    out
}

/// Intersect a prefix cohort with the support of the next transition,
/// keeping patients whose first `next` strictly follows the date at
/// which they matched the current last diagnosis.
fn continuation_cohort(
    cohort: &[(Pid, NaiveDate)],
    support: &[Pid],
    next: Did,
    dates: &FirstDateIndex,
) -> Vec<(Pid, NaiveDate)> {
    let mut out = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < cohort.len() && j < support.len() {
        let (pid, last_date) = cohort[i];
        match pid.cmp(&support[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                let next_date = dates.first_date(pid, next);
                if next_date > last_date {
                    out.push((pid, next_date));
                }
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// First-occurrence dates per patient, sorted by diagnosis for
/// binary search.
struct FirstDateIndex {
    by_pid: Vec<Vec<(Did, NaiveDate)>>,
}

impl FirstDateIndex {
    fn build(store: &PatientStore) -> Self {
        let by_pid = store
            .iter()
            .map(|patient| {
                let mut entries: Vec<(Did, NaiveDate)> = patient
                    .diagnoses
                    .iter()
                    .map(|event| (event.did, event.date))
                    .collect();
                entries.sort_unstable_by_key(|&(did, _)| did);
                entries
            })
            .collect();
        Self { by_pid }
    }

    /// First date of `did` for `pid`. Only called for patients known
    /// to carry the diagnosis.
    fn first_date(&self, pid: Pid, did: Did) -> NaiveDate {
        let entries = &self.by_pid[pid as usize];
        let at = entries
            .binary_search_by_key(&did, |&(d, _)| d)
            .expect("support member carries the diagnosis");
        entries[at].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sex;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config(min_patients: usize, min_len: usize, max_len: usize) -> ExperimentConfig {
        ExperimentConfig {
            min_patients,
            min_trajectory_length: min_len,
            max_trajectory_length: max_len,
            min_rr: 1.0,
            p_value_threshold: 0.05,
            ..ExperimentConfig::default()
        }
    }

    /// Three patients with 0 → 1 → 2 a year apart each.
    fn chain_store() -> PatientStore {
        let mut store = PatientStore::new();
        for i in 0..3 {
            let pid = store.insert(format!("p{i}"), 1950, Sex::Male, 0, None);
            store.get_mut(pid).add_diagnosis(0, date(2018, 6, 1));
            store.get_mut(pid).add_diagnosis(1, date(2019, 6, 1));
            store.get_mut(pid).add_diagnosis(2, date(2020, 6, 1));
        }
        store.canonicalize();
        store
    }

    fn significant(pairs: &mut PairMatrix, a: Did, b: Did, pids: Vec<Pid>) {
        pairs.set_rr(a, b, 2.0);
        pairs.set_p_value(a, b, 0.0);
        pairs.set_support(a, b, pids);
    }

    #[test]
    fn chains_significant_pairs_into_longer_trajectories() {
        let store = chain_store();
        let mut pairs = PairMatrix::new(3);
        significant(&mut pairs, 0, 1, vec![0, 1, 2]);
        significant(&mut pairs, 1, 2, vec![0, 1, 2]);

        let out = build_trajectories(&store, &pairs, &config(2, 2, 5), &[]);
        let sequences: Vec<Vec<Did>> = out.iter().map(|t| t.diagnoses.clone()).collect();
        assert_eq!(sequences, vec![vec![0, 1], vec![0, 1, 2], vec![1, 2]]);
    }

    #[test]
    fn revisits_are_not_allowed() {
        let store = chain_store();
        let mut pairs = PairMatrix::new(3);
        significant(&mut pairs, 0, 1, vec![0, 1, 2]);
        significant(&mut pairs, 1, 0, vec![0, 1, 2]);

        let out = build_trajectories(&store, &pairs, &config(2, 2, 5), &[]);
        let sequences: Vec<Vec<Did>> = out.iter().map(|t| t.diagnoses.clone()).collect();
        // 0 → 1 → 0 would revisit 0
        assert_eq!(sequences, vec![vec![0, 1], vec![1, 0]]);
    }

    #[test]
    fn short_trajectories_extend_but_do_not_emit() {
        let store = chain_store();
        let mut pairs = PairMatrix::new(3);
        significant(&mut pairs, 0, 1, vec![0, 1, 2]);
        significant(&mut pairs, 1, 2, vec![0, 1, 2]);

        let out = build_trajectories(&store, &pairs, &config(2, 3, 5), &[]);
        let sequences: Vec<Vec<Did>> = out.iter().map(|t| t.diagnoses.clone()).collect();
        assert_eq!(sequences, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn continuation_requires_strictly_later_dates() {
        let mut store = PatientStore::new();
        // second hop happens before the first for this patient
        let pid = store.insert("p0".into(), 1950, Sex::Male, 0, None);
        store.get_mut(pid).add_diagnosis(2, date(2017, 1, 1));
        store.get_mut(pid).add_diagnosis(0, date(2018, 1, 1));
        store.get_mut(pid).add_diagnosis(1, date(2019, 1, 1));
        store.canonicalize();

        let mut pairs = PairMatrix::new(3);
        significant(&mut pairs, 0, 1, vec![0]);
        significant(&mut pairs, 1, 2, vec![0]);

        let out = build_trajectories(&store, &pairs, &config(1, 2, 5), &[]);
        let sequences: Vec<Vec<Did>> = out.iter().map(|t| t.diagnoses.clone()).collect();
        // [0,1,2] must not appear: the patient's 2 predates their 1
        assert_eq!(sequences, vec![vec![0, 1], vec![1, 2]]);
    }

    #[test]
    fn support_counts_never_increase_along_a_trajectory() {
        let store = chain_store();
        let mut pairs = PairMatrix::new(3);
        significant(&mut pairs, 0, 1, vec![0, 1, 2]);
        significant(&mut pairs, 1, 2, vec![0, 1]);

        let out = build_trajectories(&store, &pairs, &config(1, 2, 5), &[]);
        for trajectory in &out {
            for window in trajectory.patient_counts.windows(2) {
                assert!(window[0] >= window[1]);
            }
        }
    }

    #[test]
    fn filters_compose_by_and() {
        let store = chain_store();
        let mut pairs = PairMatrix::new(3);
        significant(&mut pairs, 0, 1, vec![0, 1, 2]);
        significant(&mut pairs, 1, 2, vec![0, 1, 2]);

        let starts_with_zero: TrajectoryFilter =
            Box::new(|t: &Trajectory| t.diagnoses[0] == 0);
        let length_three: TrajectoryFilter = Box::new(|t: &Trajectory| t.diagnoses.len() == 3);
        let out = build_trajectories(
            &store,
            &pairs,
            &config(2, 2, 5),
            &[starts_with_zero, length_three],
        );
        let sequences: Vec<Vec<Did>> = out.iter().map(|t| t.diagnoses.clone()).collect();
        assert_eq!(sequences, vec![vec![0, 1, 2]]);
    }
}
