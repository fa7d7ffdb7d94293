//! Domain models: patients, diagnosis events, and the diagnosis
//! codebook.

pub mod codebook;
pub mod patient;

pub use codebook::{Codebook, CodeEntry};
pub use patient::{DiagnosisEvent, Patient, PatientStore, Sex};

use chrono::NaiveDate;

/// Dense patient identifier.
pub type Pid = u32;

/// Dense diagnosis identifier after hierarchy collapse or category
/// mapping.
pub type Did = u32;

/// Signed gap between two dates in fractional years.
///
/// Positive when `later` falls after `earlier`.
#[must_use]
pub fn years_between(earlier: NaiveDate, later: NaiveDate) -> f64 {
    (later - earlier).num_days() as f64 / 365.25
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn year_gap_is_fractional() {
        let gap = years_between(date(2020, 1, 1), date(2020, 7, 1));
        assert!(gap > 0.49 && gap < 0.51);
    }

    #[test]
    fn year_gap_is_signed() {
        let gap = years_between(date(2021, 1, 1), date(2020, 1, 1));
        assert!(gap < 0.0);
        assert!((gap + 1.0).abs() < 0.01);
    }
}
