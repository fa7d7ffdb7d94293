//! The diagnosis codebook.
//!
//! Maps external diagnosis codes onto dense analysis identifiers
//! ([`Did`]) and back. Two construction modes exist: collapsing a
//! hierarchical taxonomy at a chosen level, where several codes fold
//! into one identifier, and a many-to-many category table, where one
//! code may map onto several identifiers. The variant is a tag on
//! the mapping; call sites branch where the distinction matters.
//!
//! A configurable set of top-level chapters is excluded from
//! analysis entirely. A handful of synthetic treatment codes is
//! appended so procedure dates can take part in trajectories.

use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use smallvec::{smallvec, SmallVec};

use crate::models::Did;

/// Synthetic non-taxonomy codes injected for treatment events.
pub const SYNTHETIC_TREATMENT_CODES: &[(&str, &str)] = &[
    ("C98", "Radical cystectomy (bladder cancer)"),
    ("C99", "MVAC Chemotherapy (bladder cancer)"),
    ("C100", "Intravesical therapy (bladder cancer)"),
];

/// Chapter descriptions excluded from hierarchy-based analysis.
#[must_use]
pub fn default_excluded_chapters() -> Vec<String> {
    [
        "Pregnancy, childbirth and the puerperal (O00-O9A)",
        "Certain conditions originating in the perinatal period (P00-P96)",
        "Symptoms, signs and abnormal clinical and laboratory findings, not elsewhere classified (R00-R99)",
        "Injury, poisoning and certain other consequences of external causes (S00-T88)",
        "External causes of morbidity (V00-Y99)",
        "Factors influencing health status and contact with health services (Z00-Z99)",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// First letters of codes excluded from category-table analysis.
pub const EXCLUDED_CODE_LETTERS: &[char] = &['O', 'P', 'R', 'S', 'T', 'V', 'X', 'Y', 'Z'];

/// Descriptor of one analysis identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeEntry {
    /// Human-readable medical label.
    pub label: String,
    /// Labels of the ancestors in the taxonomy, highest level first.
    /// Empty for category-table and synthetic entries.
    pub categories: Vec<String>,
    /// Level in the taxonomy this entry was taken from.
    pub level: usize,
}

#[derive(Debug)]
enum Mapping {
    /// Hierarchy collapse: each code maps to exactly one identifier.
    Single(FxHashMap<String, Did>),
    /// Category table: a code may map to several identifiers.
    Multi(FxHashMap<String, Vec<Did>>),
}

/// Immutable bidirectional mapping between external codes and dense
/// analysis identifiers.
#[derive(Debug)]
pub struct Codebook {
    entries: Vec<CodeEntry>,
    representative: Vec<String>,
    mapping: Mapping,
}

impl Codebook {
    /// Build a codebook by collapsing a taxonomy at `level`.
    ///
    /// `codes` are the full-resolution leaf entries keyed by their
    /// external code; codes below `level` collapse onto their
    /// level-`level` ancestor label and share its identifier. Codes
    /// whose top-level chapter appears in `excluded_chapters` are
    /// dropped.
    #[must_use]
    pub fn from_hierarchy(
        codes: Vec<(String, CodeEntry)>,
        level: usize,
        excluded_chapters: &[String],
    ) -> Self {
        let mut sorted = codes;
        // identifier assignment must not depend on input order
        sorted.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut entries: Vec<CodeEntry> = Vec::new();
        let mut representative: Vec<String> = Vec::new();
        let mut by_label: FxHashMap<String, Did> = FxHashMap::default();
        let mut mapping: FxHashMap<String, Did> = FxHashMap::default();

        for (code, entry) in sorted {
            if entry
                .categories
                .first()
                .is_some_and(|chapter| excluded_chapters.iter().any(|e| e == chapter))
            {
                continue;
            }
            let label = if level >= entry.level {
                entry.label.clone()
            } else {
                entry.categories[level].clone()
            };
            let did = *by_label.entry(label.clone()).or_insert_with(|| {
                let did = entries.len() as Did;
                entries.push(CodeEntry {
                    label,
                    categories: entry.categories.clone(),
                    level: entry.level.min(level),
                });
                representative.push(code.clone());
                did
            });
            mapping.insert(code, did);
        }

        let mut book = Self {
            entries,
            representative,
            mapping: Mapping::Single(mapping),
        };
        book.append_synthetic_codes();
        log::info!(
            "Mapped {} external codes to {} analysis codes at level {}",
            book.external_code_count(),
            book.len(),
            level
        );
        book
    }

    /// Build a codebook from a many-to-many category table.
    ///
    /// `rows` associate an external code with its category
    /// identifier/label pairs. Codes starting with an excluded
    /// letter are dropped.
    #[must_use]
    pub fn from_categories(rows: Vec<(String, Vec<(String, String)>)>) -> Self {
        let mut sorted = rows;
        sorted.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut entries: Vec<CodeEntry> = Vec::new();
        let mut representative: Vec<String> = Vec::new();
        let mut by_category: FxHashMap<String, Did> = FxHashMap::default();
        let mut mapping: FxHashMap<String, Vec<Did>> = FxHashMap::default();

        for (code, categories) in sorted {
            if code
                .chars()
                .next()
                .is_some_and(|c| EXCLUDED_CODE_LETTERS.contains(&c))
            {
                continue;
            }
            let mut dids: Vec<Did> = Vec::with_capacity(categories.len());
            for (category_id, category_label) in categories {
                let did = *by_category.entry(category_id).or_insert_with(|| {
                    let did = entries.len() as Did;
                    entries.push(CodeEntry {
                        label: category_label,
                        categories: Vec::new(),
                        level: 0,
                    });
                    representative.push(code.clone());
                    did
                });
                if !dids.contains(&did) {
                    dids.push(did);
                }
            }
            if !dids.is_empty() {
                mapping.insert(code, dids);
            }
        }

        let mut book = Self {
            entries,
            representative,
            mapping: Mapping::Multi(mapping),
        };
        book.append_synthetic_codes();
        log::info!(
            "Mapped {} external codes to {} analysis codes from category table",
            book.external_code_count(),
            book.len()
        );
        book
    }

    fn append_synthetic_codes(&mut self) {
        for &(code, label) in SYNTHETIC_TREATMENT_CODES {
            let did = self.entries.len() as Did;
            self.entries.push(CodeEntry {
                label: label.to_string(),
                categories: Vec::new(),
                level: 0,
            });
            self.representative.push(code.to_string());
            match &mut self.mapping {
                Mapping::Single(map) => {
                    map.insert(code.to_string(), did);
                }
                Mapping::Multi(map) => {
                    map.insert(code.to_string(), vec![did]);
                }
            }
        }
    }

    /// Number of analysis identifiers (`D`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the codebook is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of external codes with a mapping.
    #[must_use]
    pub fn external_code_count(&self) -> usize {
        match &self.mapping {
            Mapping::Single(map) => map.len(),
            Mapping::Multi(map) => map.len(),
        }
    }

    /// Analysis identifiers for an external code. Empty when the
    /// code is unknown or excluded from analysis.
    #[must_use]
    pub fn resolve(&self, code: &str) -> SmallVec<[Did; 2]> {
        match &self.mapping {
            Mapping::Single(map) => map
                .get(code)
                .map(|&did| smallvec![did])
                .unwrap_or_default(),
            Mapping::Multi(map) => map
                .get(code)
                .map(|dids| dids.iter().copied().collect())
                .unwrap_or_default(),
        }
    }

    /// Entry for an analysis identifier.
    #[must_use]
    pub fn entry(&self, did: Did) -> &CodeEntry {
        &self.entries[did as usize]
    }

    /// Medical label of an analysis identifier.
    #[must_use]
    pub fn label(&self, did: Did) -> &str {
        &self.entries[did as usize].label
    }

    /// One external code that maps onto the identifier.
    #[must_use]
    pub fn representative_code(&self, did: Did) -> &str {
        &self.representative[did as usize]
    }

    /// Iterate over `(did, entry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Did, &CodeEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i as Did, e))
    }

    /// Stable fingerprint of the codebook, used to verify that a
    /// persisted RR matrix belongs to the same mapping.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; 8] {
        let mut hasher = Sha256::new();
        hasher.update((self.entries.len() as u64).to_be_bytes());
        for (entry, code) in self.entries.iter().zip(&self.representative) {
            hasher.update(entry.label.as_bytes());
            hasher.update([0u8]);
            hasher.update(code.as_bytes());
            hasher.update([0u8]);
        }
        let mut codes: Vec<(&String, Vec<Did>)> = match &self.mapping {
            Mapping::Single(map) => map.iter().map(|(c, &d)| (c, vec![d])).collect(),
            Mapping::Multi(map) => map.iter().map(|(c, d)| (c, d.clone())).collect(),
        };
        codes.sort_unstable_by(|a, b| a.0.cmp(b.0));
        for (code, dids) in codes {
            hasher.update(code.as_bytes());
            for did in dids {
                hasher.update(did.to_be_bytes());
            }
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        let mut out = [0u8; 8];
        out.copy_from_slice(&digest[..8]);
        out
    }
}
