//! End-to-end scenarios over the analysis engine, exercised through
//! the library API with synthetic cohorts.
//!
//! The strong-link cohort is built so that the significant pair set
//! is pinned down by the data rather than by sampling noise: the
//! `1 → 2` gap falls below the temporal window, and patients with a
//! lone `1` make the counterfactual for `1 → 3` at least as likely
//! as the observation, driving its relative risk below one.

use chrono::NaiveDate;

use trajan::algorithm::cohort::CohortIndex;
use trajan::algorithm::estimator::estimate_relative_risks;
use trajan::algorithm::trajectory::build_trajectories;
use trajan::models::{Did, PatientStore, Sex};
use trajan::ExperimentConfig;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn config() -> ExperimentConfig {
    ExperimentConfig {
        min_years: 0.5,
        max_years: 5.0,
        iterations: 10,
        min_patients: 2,
        min_trajectory_length: 2,
        max_trajectory_length: 5,
        min_rr: 1.0,
        p_value_threshold: 0.05,
        random_seed: 42,
        ..ExperimentConfig::default()
    }
}

/// 200 cases with the full chain 0, 1, 2, 3; 100 controls with a
/// lone 1; 100 controls with a lone 3. One stratum.
///
/// Case gaps: 0→1 one year, 0→2 about 1.4, 0→3 three, 2→3 about
/// 1.6; the 1→2 gap is about 0.44 years, below the window.
fn strong_link_store(case_first: bool) -> PatientStore {
    let mut store = PatientStore::new();
    let add_cases = |store: &mut PatientStore, n: usize| {
        for i in 0..n {
            let pid = store.insert(format!("case{i}"), 1950, Sex::Male, 0, None);
            let patient = store.get_mut(pid);
            patient.add_diagnosis(0, date(2019, 8, 26));
            patient.add_diagnosis(1, date(2020, 8, 26));
            patient.add_diagnosis(2, date(2021, 2, 1));
            patient.add_diagnosis(3, date(2022, 8, 26));
        }
    };
    let add_controls = |store: &mut PatientStore, n: usize| {
        for i in 0..n {
            let pid = store.insert(format!("ctl1-{i}"), 1950, Sex::Male, 0, None);
            store.get_mut(pid).add_diagnosis(1, date(2020, 8, 26));
        }
        for i in 0..n {
            let pid = store.insert(format!("ctl3-{i}"), 1950, Sex::Male, 0, None);
            store.get_mut(pid).add_diagnosis(3, date(2022, 8, 26));
        }
    };
    if case_first {
        add_cases(&mut store, 200);
        add_controls(&mut store, 100);
    } else {
        add_controls(&mut store, 100);
        add_cases(&mut store, 200);
    }
    store.canonicalize();
    store
}

fn sequences(trajectories: &[trajan::Trajectory]) -> Vec<Vec<Did>> {
    trajectories.iter().map(|t| t.diagnoses.clone()).collect()
}

#[test]
fn strong_link_cohort_emits_the_expected_trajectories() {
    let config = config();
    let mut store = strong_link_store(true);
    let cohort = CohortIndex::build(&mut store, config.nof_age_groups);
    let (pairs, _) = estimate_relative_risks(&store, &cohort, 4, &config).unwrap();

    let significant =
        pairs.significant_pairs(config.min_rr, config.min_patients, config.p_value_threshold);
    assert_eq!(significant, vec![(0, 1), (0, 2), (0, 3), (2, 3)]);

    let trajectories = build_trajectories(&store, &pairs, &config, &[]);
    assert_eq!(
        sequences(&trajectories),
        vec![
            vec![0, 1],
            vec![0, 2],
            vec![0, 2, 3],
            vec![0, 3],
            vec![2, 3],
        ]
    );
    for trajectory in &trajectories {
        for &count in &trajectory.patient_counts {
            assert_eq!(count, 200);
        }
    }
}

#[test]
fn support_sets_are_consistent_with_observations() {
    let config = config();
    let mut store = strong_link_store(true);
    let cohort = CohortIndex::build(&mut store, config.nof_age_groups);
    let (pairs, _) = estimate_relative_risks(&store, &cohort, 4, &config).unwrap();

    for a in 0..4u32 {
        for b in 0..4u32 {
            if a == b {
                continue;
            }
            let support = pairs.support(a, b);
            assert_eq!(support.len(), pairs.observed(a, b));
            assert!(support.windows(2).all(|w| w[0] < w[1]), "support is sorted");
            for &pid in support {
                let patient = store.get(pid);
                assert!(patient.first_date_of(a).is_some());
                assert!(patient.first_date_of(b).is_some());
            }
        }
    }
}

#[test]
fn support_chain_is_monotone_and_above_threshold() {
    let config = config();
    let mut store = strong_link_store(true);
    let cohort = CohortIndex::build(&mut store, config.nof_age_groups);
    let (pairs, _) = estimate_relative_risks(&store, &cohort, 4, &config).unwrap();
    let trajectories = build_trajectories(&store, &pairs, &config, &[]);
    assert!(!trajectories.is_empty());
    for trajectory in &trajectories {
        let mut previous = u32::MAX;
        for &count in &trajectory.patient_counts {
            assert!(count <= previous);
            assert!(count as usize >= config.min_patients);
            previous = count;
        }
    }
}

#[test]
fn patient_order_does_not_change_observations_or_trajectories() {
    let config = config();

    let mut store_a = strong_link_store(true);
    let cohort_a = CohortIndex::build(&mut store_a, config.nof_age_groups);
    let (pairs_a, _) = estimate_relative_risks(&store_a, &cohort_a, 4, &config).unwrap();
    let trajectories_a = build_trajectories(&store_a, &pairs_a, &config, &[]);

    let mut store_b = strong_link_store(false);
    let cohort_b = CohortIndex::build(&mut store_b, config.nof_age_groups);
    let (pairs_b, _) = estimate_relative_risks(&store_b, &cohort_b, 4, &config).unwrap();
    let trajectories_b = build_trajectories(&store_b, &pairs_b, &config, &[]);

    for a in 0..4u32 {
        for b in 0..4u32 {
            assert_eq!(pairs_a.observed(a, b), pairs_b.observed(a, b));
        }
    }
    assert_eq!(sequences(&trajectories_a), sequences(&trajectories_b));
    let counts_a: Vec<Vec<u32>> = trajectories_a.iter().map(|t| t.patient_counts.clone()).collect();
    let counts_b: Vec<Vec<u32>> = trajectories_b.iter().map(|t| t.patient_counts.clone()).collect();
    assert_eq!(counts_a, counts_b);
}

#[test]
fn runs_are_deterministic_for_a_fixed_seed() {
    let config = config();
    let mut store = strong_link_store(true);
    let cohort = CohortIndex::build(&mut store, config.nof_age_groups);

    let (pairs_a, _) = estimate_relative_risks(&store, &cohort, 4, &config).unwrap();
    let (pairs_b, _) = estimate_relative_risks(&store, &cohort, 4, &config).unwrap();
    assert_eq!(pairs_a.rr_values(), pairs_b.rr_values());
    assert_eq!(pairs_a.p_values(), pairs_b.p_values());

    let trajectories_a = build_trajectories(&store, &pairs_a, &config, &[]);
    let trajectories_b = build_trajectories(&store, &pairs_b, &config, &[]);
    assert_eq!(sequences(&trajectories_a), sequences(&trajectories_b));
}

#[test]
fn raising_the_support_threshold_silences_everything() {
    let config = ExperimentConfig {
        min_patients: 300,
        ..config()
    };
    let mut store = strong_link_store(true);
    let cohort = CohortIndex::build(&mut store, config.nof_age_groups);
    let (pairs, _) = estimate_relative_risks(&store, &cohort, 4, &config).unwrap();
    let trajectories = build_trajectories(&store, &pairs, &config, &[]);
    assert!(trajectories.is_empty());
}

#[test]
fn short_gaps_are_excluded_by_the_window() {
    // two patients, two months between a and b
    let config = config();
    let mut store = PatientStore::new();
    for i in 0..2 {
        let pid = store.insert(format!("p{i}"), 1950, Sex::Male, 0, None);
        store.get_mut(pid).add_diagnosis(0, date(2020, 1, 1));
        store.get_mut(pid).add_diagnosis(1, date(2020, 3, 1));
    }
    store.canonicalize();
    let cohort = CohortIndex::build(&mut store, config.nof_age_groups);
    let (pairs, _) = estimate_relative_risks(&store, &cohort, 2, &config).unwrap();
    assert_eq!(pairs.observed(0, 1), 0);
    assert_eq!(pairs.observed(1, 0), 0);
}

#[test]
fn equal_window_bounds_match_only_the_exact_gap() {
    let exact = 366.0 / 365.25;
    let config = ExperimentConfig {
        min_years: exact,
        max_years: exact,
        iterations: 0,
        ..config()
    };
    let mut store = PatientStore::new();
    // leap-year gap of exactly 366 days
    let pid = store.insert("hit".into(), 1950, Sex::Male, 0, None);
    store.get_mut(pid).add_diagnosis(0, date(2020, 1, 1));
    store.get_mut(pid).add_diagnosis(1, date(2021, 1, 1));
    // 365-day gap misses the window
    let pid = store.insert("miss".into(), 1950, Sex::Male, 0, None);
    store.get_mut(pid).add_diagnosis(0, date(2021, 1, 1));
    store.get_mut(pid).add_diagnosis(1, date(2022, 1, 1));
    store.canonicalize();

    let cohort = CohortIndex::build(&mut store, config.nof_age_groups);
    let (pairs, _) = estimate_relative_risks(&store, &cohort, 2, &config).unwrap();
    assert_eq!(pairs.support(0, 1), &[0]);
}

#[test]
fn a_single_patient_cannot_reach_the_support_threshold() {
    let config = config();
    let mut store = PatientStore::new();
    let pid = store.insert("only".into(), 1950, Sex::Male, 0, None);
    store.get_mut(pid).add_diagnosis(0, date(2019, 1, 1));
    store.get_mut(pid).add_diagnosis(1, date(2020, 1, 1));
    store.canonicalize();
    let cohort = CohortIndex::build(&mut store, config.nof_age_groups);
    let (pairs, _) = estimate_relative_risks(&store, &cohort, 2, &config).unwrap();
    assert_eq!(pairs.observed(0, 1), 1);
    let trajectories = build_trajectories(&store, &pairs, &config, &[]);
    assert!(trajectories.is_empty());
}
