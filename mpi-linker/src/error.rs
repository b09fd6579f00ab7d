//! Error types for mpi-linker
//!
//! Every fatal failure carries the identifiers of the records involved so a
//! run can be investigated by hand. An ignored event is not an error; see
//! [`crate::services::RunReport::Ignored`].

use crate::similarity::ScoringError;
use crate::store::StoreError;
use thiserror::Error;

/// Reconciliation run error
#[derive(Debug, Error)]
pub enum LinkerError {
    /// Candidate search or read failed; nothing was committed
    #[error("Candidate discovery failed for {remote}: {source}")]
    Discovery { remote: String, source: StoreError },

    /// Similarity could not be computed for a pair; never downgraded to a score
    #[error("Could not check link between {central} and {remote}: {source}")]
    Scoring {
        central: String,
        remote: String,
        source: ScoringError,
    },

    /// Transactional batch write failed as a whole
    #[error("Commit failed: {0}")]
    Commit(#[source] StoreError),
}

/// Result type for reconciliation runs
pub type LinkerResult<T> = Result<T, LinkerError>;
