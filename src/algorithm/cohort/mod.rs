//! Cohort stratification and matched counterfactual sampling.
//!
//! Patients are partitioned into strata keyed by sex, age bucket,
//! and region. The age buckets are derived from the observed
//! year-of-birth range and the configured bucket count. The index
//! supports drawing a random set of patients whose stratum
//! composition matches a reference multiset, which is the sampling
//! primitive of the relative-risk estimator.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::{PatientStore, Pid, Sex};

/// Stratum key of a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stratum {
    pub sex: Sex,
    pub age_bucket: usize,
    pub region: usize,
}

/// Outcome counters of a matched sampling call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleOutcome {
    /// Strata that could not supply the requested number of unique
    /// patients and were returned whole.
    pub saturated_strata: usize,
}

/// Partition of the patient population into strata.
pub struct CohortIndex {
    nof_age_buckets: usize,
    nof_regions: usize,
    min_year_of_birth: i32,
    bucket_width: i32,
    /// Patients per encoded stratum, in ascending pid order.
    strata: Vec<Vec<Pid>>,
    /// Encoded stratum per pid.
    stratum_by_pid: Vec<usize>,
}

impl CohortIndex {
    /// Build the index, assigning every patient its age bucket.
    ///
    /// With a single age group every patient lands in bucket 0;
    /// otherwise the year-of-birth range splits into
    /// `nof_age_buckets` buckets of equal (ceiled) width.
    #[must_use]
    pub fn build(store: &mut PatientStore, nof_age_buckets: usize) -> Self {
        let min_yob = store.min_year_of_birth().unwrap_or(0);
        let max_yob = store.max_year_of_birth().unwrap_or(0);
        let bucket_width = if nof_age_buckets > 1 {
            let width = ((max_yob - min_yob) as f64 / nof_age_buckets as f64).ceil() as i32;
            width.max(1)
        } else {
            1
        };

        let nof_regions = store.nof_regions.max(1);
        let mut strata = vec![Vec::new(); 2 * nof_age_buckets * nof_regions];
        let mut stratum_by_pid = vec![0usize; store.len()];

        for patient in store.iter_mut() {
            let bucket = if nof_age_buckets > 1 {
                (((patient.year_of_birth - min_yob) / bucket_width) as usize)
                    .min(nof_age_buckets - 1)
            } else {
                0
            };
            patient.age_bucket = bucket;
            let encoded = encode(patient.sex, bucket, patient.region, nof_age_buckets, nof_regions);
            strata[encoded].push(patient.pid);
            stratum_by_pid[patient.pid as usize] = encoded;
        }

        log::info!(
            "Built cohort index: {} age buckets of {} years, {} regions, {} non-empty strata",
            nof_age_buckets,
            bucket_width,
            nof_regions,
            strata.iter().filter(|s| !s.is_empty()).count()
        );

        Self {
            nof_age_buckets,
            nof_regions,
            min_year_of_birth: min_yob,
            bucket_width,
            strata,
            stratum_by_pid,
        }
    }

    /// Number of encoded strata (including empty ones).
    #[must_use]
    pub fn nof_strata(&self) -> usize {
        self.strata.len()
    }

    /// Encoded stratum of a patient.
    #[must_use]
    pub fn stratum_of(&self, pid: Pid) -> usize {
        self.stratum_by_pid[pid as usize]
    }

    /// Decode an encoded stratum back into its key.
    #[must_use]
    pub fn decode(&self, encoded: usize) -> Stratum {
        let region = encoded % self.nof_regions;
        let rest = encoded / self.nof_regions;
        let age_bucket = rest % self.nof_age_buckets;
        let sex = if rest / self.nof_age_buckets == 0 {
            Sex::Male
        } else {
            Sex::Female
        };
        Stratum {
            sex,
            age_bucket,
            region,
        }
    }

    /// Patients in an encoded stratum, ascending by pid.
    #[must_use]
    pub fn patients_in(&self, encoded: usize) -> &[Pid] {
        &self.strata[encoded]
    }

    /// Age bucket a patient with the given year of birth falls into.
    #[must_use]
    pub fn bucket_for_year(&self, year_of_birth: i32) -> usize {
        if self.nof_age_buckets > 1 {
            (((year_of_birth - self.min_year_of_birth) / self.bucket_width) as usize)
                .min(self.nof_age_buckets - 1)
        } else {
            0
        }
    }

    /// Sparse stratum-count multiset of a reference patient set.
    #[must_use]
    pub fn stratum_counts(&self, pids: &[Pid]) -> Vec<(usize, usize)> {
        let mut counts = vec![0usize; self.strata.len()];
        for &pid in pids {
            counts[self.stratum_by_pid[pid as usize]] += 1;
        }
        counts
            .into_iter()
            .enumerate()
            .filter(|&(_, n)| n > 0)
            .collect()
    }

    /// Draw a random patient set matching a stratum-count multiset.
    ///
    /// Within each stratum the draw is uniform without replacement.
    /// A stratum asked for more patients than it holds is returned
    /// whole and counted as saturated. Sampled pids are appended to
    /// `out` in stratum order.
    pub fn sample_matching<R: Rng>(
        &self,
        counts: &[(usize, usize)],
        rng: &mut R,
        out: &mut Vec<Pid>,
    ) -> SampleOutcome {
        let mut outcome = SampleOutcome::default();
        let mut scratch: Vec<Pid> = Vec::new();
        for &(stratum, wanted) in counts {
            let pool = &self.strata[stratum];
            if wanted >= pool.len() {
                out.extend_from_slice(pool);
                if wanted > pool.len() {
                    outcome.saturated_strata += 1;
                }
                continue;
            }
            scratch.clear();
            scratch.extend_from_slice(pool);
            let (picked, _) = scratch.partial_shuffle(rng, wanted);
            out.extend_from_slice(picked);
        }
        outcome
    }
}

fn encode(sex: Sex, age_bucket: usize, region: usize, nof_age_buckets: usize, nof_regions: usize) -> usize {
    (sex.index() * nof_age_buckets + age_bucket) * nof_regions + region
}
