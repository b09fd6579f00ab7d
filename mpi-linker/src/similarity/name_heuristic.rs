//! Name + birth date + gender heuristic
//!
//! **Algorithm:**
//! 1. Birth dates missing on either side, or different days → `0.001`
//! 2. Genders missing on either side, or different codes → `0.002`
//! 3. No primary name on either side → `0.003`
//! 4. Family name and joined given names identical → `1.0`
//! 5. Otherwise compare family and given names by normalized Levenshtein
//!    similarity. A component under `0.75` with a nonzero edit distance counts
//!    as `0.0`. Either component under `0.7` → `0.004`, else the smaller of
//!    the two.
//!
//! The small distinct constants for the rejection paths make it visible in
//! logs which rule rejected a pair.

use super::{PatientSimilarity, ScoringError};
use async_trait::async_trait;
use mpi_common::PatientRecord;

const NO_SAME_BIRTH_DATE: f32 = 0.001;
const GENDER_MISMATCH: f32 = 0.002;
const NO_NAME: f32 = 0.003;
const NAME_TOO_DIFFERENT: f32 = 0.004;

/// Per-component floor below which a fuzzy match counts as no match
const COMPONENT_FLOOR: f64 = 0.75;
/// Minimum accepted similarity for both family and given names
const COMPONENT_MIN: f32 = 0.7;

/// Reference heuristic scorer
#[derive(Debug, Default, Clone, Copy)]
pub struct NameBirthGenderSimilarity;

impl NameBirthGenderSimilarity {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous scoring rule
    pub fn score(a: &PatientRecord, b: &PatientRecord) -> f32 {
        match (a.birth_date_day(), b.birth_date_day()) {
            (Some(da), Some(db)) if da == db => {}
            _ => return NO_SAME_BIRTH_DATE,
        }

        match (a.gender, b.gender) {
            (Some(ga), Some(gb)) if ga.code().eq_ignore_ascii_case(gb.code()) => {}
            (ga, gb) => {
                tracing::info!(gender_a = ?ga, gender_b = ?gb, "Gender mismatch");
                return GENDER_MISMATCH;
            }
        }

        let (Some(name_a), Some(name_b)) = (a.primary_name(), b.primary_name()) else {
            return NO_NAME;
        };

        let family_a = name_a.family_or_empty();
        let family_b = name_b.family_or_empty();
        let given_a = name_a.given_as_single_string();
        let given_b = name_b.given_as_single_string();

        if family_a == family_b && given_a == given_b {
            return 1.0;
        }

        let family = component_similarity(family_a, family_b);
        let given = component_similarity(&given_a, &given_b);
        if family < COMPONENT_MIN || given < COMPONENT_MIN {
            return NAME_TOO_DIFFERENT;
        }
        family.min(given)
    }
}

fn component_similarity(a: &str, b: &str) -> f32 {
    let distance = strsim::levenshtein(a, b);
    let similarity = strsim::normalized_levenshtein(a, b);
    if similarity < COMPONENT_FLOOR && distance > 0 {
        return 0.0;
    }
    similarity as f32
}

#[async_trait]
impl PatientSimilarity for NameBirthGenderSimilarity {
    fn name(&self) -> &'static str {
        "name-birthdate-gender"
    }

    async fn similarity(&self, a: &PatientRecord, b: &PatientRecord) -> Result<f32, ScoringError> {
        let a = a.clone();
        let b = b.clone();
        tokio::task::spawn_blocking(move || Self::score(&a, &b))
            .await
            .map_err(|e| ScoringError::Failed(format!("scoring task failed: {}", e)))
    }
}
