//! Similarity scoring capability
//!
//! A scorer answers one question: how likely are two demographic records the
//! same person, as a value in `[0, 1]`. Implementations are injected into the
//! reconciler as `Arc<dyn PatientSimilarity>`; the reconciler owns the timeout.

mod name_heuristic;

pub use name_heuristic::NameBirthGenderSimilarity;

use async_trait::async_trait;
use mpi_common::PatientRecord;
use std::time::Duration;
use thiserror::Error;

/// Scoring errors
#[derive(Debug, Clone, Error)]
pub enum ScoringError {
    /// No score within the bounded wait
    #[error("similarity timed out after {0:?}")]
    Timeout(Duration),

    /// Computation fault
    #[error("similarity failed: {0}")]
    Failed(String),
}

/// Pluggable similarity algorithm
///
/// Must be pure with respect to stored state and deterministic enough that
/// scoring the same pair twice lands on the same side of the threshold.
#[async_trait]
pub trait PatientSimilarity: Send + Sync {
    /// Algorithm name for logs
    fn name(&self) -> &'static str;

    /// Score two records, `0.0` = different people, `1.0` = certainly the same
    async fn similarity(&self, a: &PatientRecord, b: &PatientRecord) -> Result<f32, ScoringError>;
}

/// Run a scorer with a mandatory bounded wait
///
/// A timeout or a score outside `[0, 1]` (including NaN) is an error, never a
/// default score.
pub async fn score_within(
    scorer: &dyn PatientSimilarity,
    a: &PatientRecord,
    b: &PatientRecord,
    timeout: Duration,
) -> Result<f32, ScoringError> {
    let score = tokio::time::timeout(timeout, scorer.similarity(a, b))
        .await
        .map_err(|_| ScoringError::Timeout(timeout))??;

    if !(0.0..=1.0).contains(&score) {
        return Err(ScoringError::Failed(format!(
            "{} returned out-of-range score {}",
            scorer.name(),
            score
        )));
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f32);

    #[async_trait]
    impl PatientSimilarity for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn similarity(&self, _: &PatientRecord, _: &PatientRecord) -> Result<f32, ScoringError> {
            Ok(self.0)
        }
    }

    struct Stalled;

    #[async_trait]
    impl PatientSimilarity for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn similarity(&self, _: &PatientRecord, _: &PatientRecord) -> Result<f32, ScoringError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(1.0)
        }
    }

    #[tokio::test]
    async fn test_score_passes_through() {
        let p = PatientRecord::default();
        let score = score_within(&Fixed(0.97), &p, &p, Duration::from_secs(1)).await.unwrap();
        assert_eq!(score, 0.97);
    }

    #[tokio::test]
    async fn test_out_of_range_is_failure() {
        let p = PatientRecord::default();
        for bad in [f32::NAN, -0.1, 1.2] {
            let result = score_within(&Fixed(bad), &p, &p, Duration::from_secs(1)).await;
            assert!(matches!(result, Err(ScoringError::Failed(_))), "{}", bad);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_error_not_default() {
        let p = PatientRecord::default();
        let result = score_within(&Stalled, &p, &p, Duration::from_secs(10)).await;
        assert!(matches!(result, Err(ScoringError::Timeout(d)) if d == Duration::from_secs(10)));
    }
}
