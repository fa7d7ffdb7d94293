//! Patient entities and the dense patient arena.
//!
//! Patients live in a contiguous vector indexed by their dense
//! [`Pid`]; diagnosis events are plain `(did, date)` pairs owned by
//! the patient. After ingest every diagnosis list is brought into
//! canonical form: sorted by date and reduced to the earliest event
//! per diagnosis code. All later stages assume that form.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::models::{Did, Pid};

/// Patient sex as recorded in the patient table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Index used when encoding strata.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Male => 0,
            Self::Female => 1,
        }
    }

    /// Single-letter representation used in report files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }
}

/// A single dated diagnosis event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosisEvent {
    /// Dense diagnosis identifier.
    pub did: Did,
    /// Date of the event.
    pub date: NaiveDate,
}

/// A patient with demographic attributes and a diagnosis history.
#[derive(Debug, Clone)]
pub struct Patient {
    /// Dense identifier, index into the patient arena.
    pub pid: Pid,
    /// Identifier from the source data.
    pub external_id: String,
    /// Year of birth.
    pub year_of_birth: i32,
    /// Recorded sex.
    pub sex: Sex,
    /// Age stratum assigned by the cohort index.
    pub age_bucket: usize,
    /// Dense region index.
    pub region: usize,
    /// Date of death, if known (day defaults to the first).
    pub death_date: Option<NaiveDate>,
    /// First event-of-interest date, if any.
    pub eoi_date: Option<NaiveDate>,
    /// Diagnosis events; canonical form is date-ascending with one
    /// entry per distinct code (the earliest).
    pub diagnoses: Vec<DiagnosisEvent>,
}

impl Patient {
    /// Append a raw diagnosis event. Call [`Patient::canonicalize`]
    /// once ingest is complete.
    pub fn add_diagnosis(&mut self, did: Did, date: NaiveDate) {
        self.diagnoses.push(DiagnosisEvent { did, date });
    }

    /// Sort the diagnosis list by `(date, did)` and keep only the
    /// earliest event per code.
    pub fn canonicalize(&mut self) {
        self.diagnoses.sort_unstable_by_key(|d| (d.date, d.did));
        let mut seen = FxHashMap::default();
        self.diagnoses.retain(|d| {
            // first occurrence wins; list is already date-sorted
            seen.insert(d.did, ()).is_none()
        });
    }

    /// Date of the earliest event with the given code, if present.
    ///
    /// Assumes canonical form.
    #[must_use]
    pub fn first_date_of(&self, did: Did) -> Option<NaiveDate> {
        self.diagnoses.iter().find(|d| d.did == did).map(|d| d.date)
    }

    /// Age in completed years at the given date.
    #[must_use]
    pub fn age_at(&self, date: NaiveDate) -> i32 {
        use chrono::Datelike;
        date.year() - self.year_of_birth
    }
}

/// Arena of patients with a lookup from source identifiers.
#[derive(Debug, Default)]
pub struct PatientStore {
    patients: Vec<Patient>,
    by_external_id: FxHashMap<String, Pid>,
    /// Number of male patients.
    pub male_count: usize,
    /// Number of female patients.
    pub female_count: usize,
    /// Number of distinct regions seen during ingest.
    pub nof_regions: usize,
}

impl PatientStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a patient, assigning the next dense identifier.
    ///
    /// The caller provides every attribute except `pid` and
    /// `age_bucket`, which the store and the cohort index assign.
    pub fn insert(
        &mut self,
        external_id: String,
        year_of_birth: i32,
        sex: Sex,
        region: usize,
        death_date: Option<NaiveDate>,
    ) -> Pid {
        let pid = self.patients.len() as Pid;
        match sex {
            Sex::Male => self.male_count += 1,
            Sex::Female => self.female_count += 1,
        }
        self.nof_regions = self.nof_regions.max(region + 1);
        self.by_external_id.insert(external_id.clone(), pid);
        self.patients.push(Patient {
            pid,
            external_id,
            year_of_birth,
            sex,
            age_bucket: 0,
            region,
            death_date,
            eoi_date: None,
            diagnoses: Vec::new(),
        });
        pid
    }

    /// Number of patients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patients.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Patient by dense identifier.
    #[must_use]
    pub fn get(&self, pid: Pid) -> &Patient {
        &self.patients[pid as usize]
    }

    /// Mutable patient by dense identifier.
    pub fn get_mut(&mut self, pid: Pid) -> &mut Patient {
        &mut self.patients[pid as usize]
    }

    /// Resolve a source identifier to a dense identifier.
    #[must_use]
    pub fn resolve(&self, external_id: &str) -> Option<Pid> {
        self.by_external_id.get(external_id).copied()
    }

    /// All patients as a slice, indexed by pid.
    #[must_use]
    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    /// Iterate over all patients in pid order.
    pub fn iter(&self) -> impl Iterator<Item = &Patient> {
        self.patients.iter()
    }

    /// Iterate mutably over all patients in pid order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Patient> {
        self.patients.iter_mut()
    }

    /// Bring every diagnosis list into canonical form.
    pub fn canonicalize(&mut self) {
        for patient in &mut self.patients {
            patient.canonicalize();
        }
    }

    /// Smallest year of birth across all patients.
    #[must_use]
    pub fn min_year_of_birth(&self) -> Option<i32> {
        self.patients.iter().map(|p| p.year_of_birth).min()
    }

    /// Largest year of birth across all patients.
    #[must_use]
    pub fn max_year_of_birth(&self) -> Option<i32> {
        self.patients.iter().map(|p| p.year_of_birth).max()
    }

    /// Apply patient filters, dropping patients that fail any of
    /// them and reassigning dense identifiers.
    ///
    /// Filters may trim the diagnosis history of patients they keep,
    /// so the surviving lists are re-canonicalized.
    #[must_use]
    pub fn retain_filtered<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&mut Patient) -> bool,
    {
        let mut out = Self::new();
        for mut patient in self.patients {
            if !keep(&mut patient) {
                continue;
            }
            let pid = out.insert(
                std::mem::take(&mut patient.external_id),
                patient.year_of_birth,
                patient.sex,
                patient.region,
                patient.death_date,
            );
            let slot = out.get_mut(pid);
            slot.eoi_date = patient.eoi_date;
            slot.diagnoses = std::mem::take(&mut patient.diagnoses);
            slot.canonicalize();
        }
        // region count does not shrink when filtering; stratum
        // encoding must stay stable across filter variants
        out.nof_regions = out.nof_regions.max(self.nof_regions);
        out
    }
}
