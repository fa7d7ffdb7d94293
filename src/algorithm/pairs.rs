//! Dense per-pair statistics.
//!
//! For every ordered pair of analysis identifiers `(a, b)` the
//! matrix tracks the relative risk, the discrete p-value, and the
//! sorted set of patients whose histories witness `a` before `b`
//! within the temporal window. The diagonal is never populated.

use crate::models::{Did, Pid};

/// Dense `D×D` pair statistics.
#[derive(Debug)]
pub struct PairMatrix {
    d: usize,
    rr: Vec<f64>,
    p_value: Vec<f64>,
    support: Vec<Vec<Pid>>,
}

impl PairMatrix {
    /// Create an empty matrix for `d` analysis identifiers.
    ///
    /// Relative risks start at zero and p-values at one, so an
    /// untouched pair is never significant.
    #[must_use]
    pub fn new(d: usize) -> Self {
        Self {
            d,
            rr: vec![0.0; d * d],
            p_value: vec![1.0; d * d],
            support: vec![Vec::new(); d * d],
        }
    }

    /// Assemble a matrix from row-major parts. Used by the
    /// estimator and by persistence.
    ///
    /// # Panics
    /// Panics when the part lengths are not `d * d`.
    #[must_use]
    pub fn from_parts(d: usize, rr: Vec<f64>, p_value: Vec<f64>, support: Vec<Vec<Pid>>) -> Self {
        assert_eq!(rr.len(), d * d);
        assert_eq!(p_value.len(), d * d);
        assert_eq!(support.len(), d * d);
        Self {
            d,
            rr,
            p_value,
            support,
        }
    }

    /// Number of analysis identifiers (`D`).
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.d
    }

    #[inline]
    fn idx(&self, a: Did, b: Did) -> usize {
        a as usize * self.d + b as usize
    }

    /// Relative risk of `a → b`.
    #[must_use]
    pub fn rr(&self, a: Did, b: Did) -> f64 {
        self.rr[self.idx(a, b)]
    }

    /// Set the relative risk of `a → b`.
    pub fn set_rr(&mut self, a: Did, b: Did, value: f64) {
        let idx = self.idx(a, b);
        self.rr[idx] = value;
    }

    /// Discrete p-value of `a → b`.
    #[must_use]
    pub fn p_value(&self, a: Did, b: Did) -> f64 {
        self.p_value[self.idx(a, b)]
    }

    /// Set the discrete p-value of `a → b`.
    pub fn set_p_value(&mut self, a: Did, b: Did, value: f64) {
        let idx = self.idx(a, b);
        self.p_value[idx] = value;
    }

    /// Patients witnessing `a → b`, ascending by pid.
    #[must_use]
    pub fn support(&self, a: Did, b: Did) -> &[Pid] {
        &self.support[self.idx(a, b)]
    }

    /// Replace the support set of `a → b`. The list must be sorted.
    pub fn set_support(&mut self, a: Did, b: Did, pids: Vec<Pid>) {
        debug_assert!(pids.windows(2).all(|w| w[0] < w[1]));
        let idx = self.idx(a, b);
        self.support[idx] = pids;
    }

    /// Number of patients observed for `a → b`.
    #[must_use]
    pub fn observed(&self, a: Did, b: Did) -> usize {
        self.support[self.idx(a, b)].len()
    }

    /// Whether `a → b` passes the significance thresholds.
    #[must_use]
    pub fn is_significant(
        &self,
        a: Did,
        b: Did,
        min_rr: f64,
        min_patients: usize,
        p_value_threshold: f64,
    ) -> bool {
        a != b
            && self.rr(a, b) >= min_rr
            && self.observed(a, b) >= min_patients
            && self.p_value(a, b) <= p_value_threshold
    }

    /// All significant ordered pairs in lexicographic order.
    #[must_use]
    pub fn significant_pairs(
        &self,
        min_rr: f64,
        min_patients: usize,
        p_value_threshold: f64,
    ) -> Vec<(Did, Did)> {
        let mut pairs = Vec::new();
        for a in 0..self.d as Did {
            for b in 0..self.d as Did {
                if self.is_significant(a, b, min_rr, min_patients, p_value_threshold) {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }

    /// Raw row-major relative-risk values.
    #[must_use]
    pub fn rr_values(&self) -> &[f64] {
        &self.rr
    }

    /// Raw row-major p-values.
    #[must_use]
    pub fn p_values(&self) -> &[f64] {
        &self.p_value
    }

    /// Raw row-major support sets.
    #[must_use]
    pub fn support_sets(&self) -> &[Vec<Pid>] {
        &self.support
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_pairs_are_insignificant() {
        let pairs = PairMatrix::new(4);
        assert!(pairs.significant_pairs(1.0, 1, 0.05).is_empty());
    }

    #[test]
    fn significance_combines_all_thresholds() {
        let mut pairs = PairMatrix::new(3);
        pairs.set_rr(0, 1, 2.5);
        pairs.set_p_value(0, 1, 0.0);
        pairs.set_support(0, 1, vec![0, 1, 2]);

        assert!(pairs.is_significant(0, 1, 1.0, 3, 0.05));
        assert!(!pairs.is_significant(0, 1, 3.0, 3, 0.05), "rr below threshold");
        assert!(!pairs.is_significant(0, 1, 1.0, 4, 0.05), "support below threshold");

        pairs.set_p_value(0, 1, 0.2);
        assert!(!pairs.is_significant(0, 1, 1.0, 3, 0.05), "p-value above threshold");
    }

    #[test]
    fn significant_pairs_are_lexicographic() {
        let mut pairs = PairMatrix::new(3);
        for &(a, b) in &[(2, 0), (0, 2), (1, 0)] {
            pairs.set_rr(a, b, 2.0);
            pairs.set_p_value(a, b, 0.0);
            pairs.set_support(a, b, vec![0, 1]);
        }
        assert_eq!(
            pairs.significant_pairs(1.0, 2, 0.05),
            vec![(0, 2), (1, 0), (2, 0)]
        );
    }
}
