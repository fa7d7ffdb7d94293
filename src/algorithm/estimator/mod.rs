//! Relative-risk estimation.
//!
//! Two data-parallel passes fill the pair matrix. The observed pass
//! scans every patient once and records, for each ordered pair
//! `(a, b)`, the patients whose first `a` precedes their first `b`
//! within the configured temporal window. The Monte-Carlo pass then
//! repeatedly draws, for every target diagnosis `b`, a counterfactual
//! population matching the stratum composition of the patients who
//! actually have `b`, reassigns those patients a `b` date donated by
//! a random `b` patient of their stratum, and counts how often the
//! temporal predicate still holds. The relative risk of a pair is
//! the observed count over the mean simulated count; the discrete
//! p-value is the fraction of iterations whose simulated count
//! reached the observed one.
//!
//! Iterations are split into contiguous chunks across workers, each
//! with its own accumulators and a generator seeded from the global
//! seed and the worker index, so results are reproducible for a
//! fixed `(seed, worker count, iteration count)`.

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::NaiveDate;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::algorithm::cohort::CohortIndex;
use crate::algorithm::pairs::PairMatrix;
use crate::config::ExperimentConfig;
use crate::error::{Result, TrajanError};
use crate::models::{years_between, PatientStore, Pid};
use crate::utils::progress;

/// Counters reported after estimation.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatorSummary {
    /// Ordered pairs with at least one supporting patient.
    pub pairs_with_support: usize,
    /// Monte-Carlo iterations performed.
    pub iterations: usize,
    /// Stratum draws that were saturated (stratum returned whole).
    pub saturated_draws: usize,
}

/// Per-diagnosis lookup tables used by the Monte-Carlo pass.
struct DiagnosisIndex {
    /// Patients having each diagnosis, ascending by pid.
    patients_with: Vec<Vec<Pid>>,
    /// Sparse stratum-count multiset of each diagnosis cohort.
    stratum_counts: Vec<Vec<(usize, usize)>>,
    /// First-occurrence dates of each diagnosis, per stratum.
    donor_dates: Vec<FxHashMap<usize, Vec<NaiveDate>>>,
}

impl DiagnosisIndex {
    fn build(store: &PatientStore, cohort: &CohortIndex, d: usize) -> Self {
        let mut patients_with: Vec<Vec<Pid>> = vec![Vec::new(); d];
        let mut donor_dates: Vec<FxHashMap<usize, Vec<NaiveDate>>> =
            vec![FxHashMap::default(); d];
        for patient in store.iter() {
            let stratum = cohort.stratum_of(patient.pid);
            for event in &patient.diagnoses {
                patients_with[event.did as usize].push(patient.pid);
                donor_dates[event.did as usize]
                    .entry(stratum)
                    .or_default()
                    .push(event.date);
            }
        }
        let stratum_counts = patients_with
            .iter()
            .map(|pids| cohort.stratum_counts(pids))
            .collect();
        Self {
            patients_with,
            stratum_counts,
            donor_dates,
        }
    }
}

/// Per-worker Monte-Carlo accumulators.
struct WorkerAccum {
    sim_sum: Vec<u64>,
    ge_count: Vec<u32>,
    saturated: usize,
}

impl WorkerAccum {
    fn new(cells: usize) -> Self {
        Self {
            sim_sum: vec![0; cells],
            ge_count: vec![0; cells],
            saturated: 0,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.sim_sum.iter_mut().zip(other.sim_sum) {
            *a += b;
        }
        for (a, b) in self.ge_count.iter_mut().zip(other.ge_count) {
            *a += b;
        }
        self.saturated += other.saturated;
        self
    }
}

/// Run the full estimation and return the filled pair matrix.
///
/// # Errors
/// A panic in any worker is converted into a
/// [`TrajanError::Estimator`] at the join point.
pub fn estimate_relative_risks(
    store: &PatientStore,
    cohort: &CohortIndex,
    d: usize,
    config: &ExperimentConfig,
) -> Result<(PairMatrix, EstimatorSummary)> {
    catch_unwind(AssertUnwindSafe(|| {
        estimate_inner(store, cohort, d, config)
    }))
    .map_err(|cause| {
        let message = cause
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| cause.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".to_string());
        TrajanError::Estimator(message).into()
    })
}

fn estimate_inner(
    store: &PatientStore,
    cohort: &CohortIndex,
    d: usize,
    config: &ExperimentConfig,
) -> (PairMatrix, EstimatorSummary) {
    info!(
        "Estimating relative risks for {} patients, {} diagnosis codes, {} iterations",
        store.len(),
        d,
        config.iterations
    );

    let support = observed_pass(store, d, config.min_years, config.max_years);
    let observed: Vec<u32> = support.iter().map(|s| s.len() as u32).collect();
    let pairs_with_support = observed.iter().filter(|&&n| n > 0).count();
    info!("Observed co-occurrences for {pairs_with_support} ordered pairs");

    let iterations = config.iterations;
    let mut rr = vec![0.0f64; d * d];
    let mut p_value = vec![1.0f64; d * d];
    let mut saturated = 0usize;

    if iterations == 0 {
        // no sampling: infinite risk wherever something was observed,
        // p-values stay at one so nothing is significant
        for (idx, &obs) in observed.iter().enumerate() {
            if obs > 0 {
                rr[idx] = f64::INFINITY;
            }
        }
    } else {
        let index = DiagnosisIndex::build(store, cohort, d);
        let totals = monte_carlo_pass(store, cohort, &index, &observed, d, config);
        saturated = totals.saturated;

        for a in 0..d {
            for b in 0..d {
                if a == b {
                    continue;
                }
                let idx = a * d + b;
                let obs = observed[idx];
                let mean_sim = totals.sim_sum[idx] as f64 / iterations as f64;
                if obs == 0 {
                    // 0 / x and 0 / 0 are both zero risk
                    continue;
                }
                rr[idx] = if mean_sim == 0.0 {
                    f64::INFINITY
                } else {
                    f64::from(obs) / mean_sim
                };
                p_value[idx] = f64::from(totals.ge_count[idx]) / iterations as f64;
            }
        }
    }

    if saturated > 0 {
        warn!("{saturated} stratum draws were saturated (stratum returned whole)");
    }

    let matrix = PairMatrix::from_parts(d, rr, p_value, support);
    let summary = EstimatorSummary {
        pairs_with_support,
        iterations,
        saturated_draws: saturated,
    };
    (matrix, summary)
}

/// Observed-count pass: one linear scan over patients, partitioned
/// across workers into private hit lists that are merged and sorted
/// once, so the result does not depend on patient order or worker
/// count.
fn observed_pass(store: &PatientStore, d: usize, min_years: f64, max_years: f64) -> Vec<Vec<Pid>> {
    let mut hits: Vec<(u64, Pid)> = store
        .patients()
        .par_iter()
        .fold(Vec::new, |mut acc, patient| {
            let diagnoses = &patient.diagnoses;
            for i in 0..diagnoses.len() {
                for j in (i + 1)..diagnoses.len() {
                    let gap = years_between(diagnoses[i].date, diagnoses[j].date);
                    if gap >= min_years && gap <= max_years {
                        let key =
                            diagnoses[i].did as u64 * d as u64 + diagnoses[j].did as u64;
                        acc.push((key, patient.pid));
                    }
                }
            }
            acc
        })
        .reduce(Vec::new, |mut a, mut b| {
            a.append(&mut b);
            a
        });

    hits.par_sort_unstable();

    let mut support: Vec<Vec<Pid>> = vec![Vec::new(); d * d];
    for (key, pid) in hits {
        support[key as usize].push(pid);
    }
    support
}

fn monte_carlo_pass(
    store: &PatientStore,
    cohort: &CohortIndex,
    index: &DiagnosisIndex,
    observed: &[u32],
    d: usize,
    config: &ExperimentConfig,
) -> WorkerAccum {
    let iterations = config.iterations;
    let workers = rayon::current_num_threads();
    let chunk = iterations.div_ceil(workers);
    let bar = progress::main_bar(iterations as u64, "Sampling counterfactual cohorts");

    let totals = (0..workers)
        .into_par_iter()
        .map(|worker| {
            let start = worker * chunk;
            let end = iterations.min(start + chunk);
            let mut rng = StdRng::seed_from_u64(config.random_seed.wrapping_add(worker as u64));
            let mut accum = WorkerAccum::new(d * d);
            let mut sim = vec![0u32; d * d];
            let mut touched: Vec<usize> = Vec::new();
            let mut sample: Vec<Pid> = Vec::new();

            for _ in start..end {
                for b in 0..d {
                    if index.patients_with[b].is_empty() {
                        continue;
                    }
                    sample.clear();
                    let outcome =
                        cohort.sample_matching(&index.stratum_counts[b], &mut rng, &mut sample);
                    accum.saturated += outcome.saturated_strata;

                    for &pid in &sample {
                        let stratum = cohort.stratum_of(pid);
                        let dates = &index.donor_dates[b][&stratum];
                        let donor = dates[rng.gen_range(0..dates.len())];
                        for event in &store.get(pid).diagnoses {
                            if event.did as usize == b {
                                continue;
                            }
                            let gap = years_between(event.date, donor);
                            if gap >= config.min_years && gap <= config.max_years {
                                let idx = event.did as usize * d + b;
                                if sim[idx] == 0 {
                                    touched.push(idx);
                                }
                                sim[idx] += 1;
                            }
                        }
                    }
                }
                for &idx in &touched {
                    accum.sim_sum[idx] += u64::from(sim[idx]);
                    if sim[idx] >= observed[idx] {
                        accum.ge_count[idx] += 1;
                    }
                    sim[idx] = 0;
                }
                touched.clear();
                bar.inc(1);
            }
            accum
        })
        .reduce(|| WorkerAccum::new(d * d), WorkerAccum::merge);

    progress::finish(&bar, "Sampling complete");
    totals
}
