//! Link reconciliation for one (central, remote) pair
//!
//! Two states, driven by the similarity score against the process-wide
//! threshold:
//!
//! | current   | score >= threshold        | score < threshold             |
//! |-----------|---------------------------|-------------------------------|
//! | NotLinked | add link → Linked         | no-op → NotLinked             |
//! | Linked    | no-op → Linked            | remove link(s) → NotLinked    |
//!
//! Mutations are applied to the change set's working copy of the central
//! record, so repeated decisions on the same record in one run accumulate.

use super::change_batch::ChangeSet;
use crate::error::{LinkerError, LinkerResult};
use crate::similarity::{score_within, PatientSimilarity};
use mpi_common::{LinkAnnotation, PatientRecord, ResourceId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Link state of a pair before reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Linked,
    NotLinked,
}

/// What reconciliation did to the central record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTransition {
    /// Link annotation appended
    Added,
    /// Already linked and still above threshold
    Kept,
    /// Still linked; surplus duplicate annotations dropped
    Deduplicated { removed: usize },
    /// Below threshold; every annotation to the remote record dropped
    Removed { removed: usize },
    /// Not linked and below threshold
    Unchanged,
}

impl LinkTransition {
    /// Whether the pair is linked after the transition
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::Added | Self::Kept | Self::Deduplicated { .. })
    }

    /// Whether the central record was mutated
    pub fn mutates(&self) -> bool {
        matches!(self, Self::Added | Self::Deduplicated { .. } | Self::Removed { .. })
    }
}

/// Pure transition rule
pub fn decide(state: LinkState, above_threshold: bool) -> LinkState {
    match (state, above_threshold) {
        (_, true) => LinkState::Linked,
        (_, false) => LinkState::NotLinked,
    }
}

/// Outcome of reconciling one pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkDecision {
    pub central: Option<ResourceId>,
    pub remote: ResourceId,
    pub score: f32,
    pub before: LinkState,
    pub transition: LinkTransition,
}

impl LinkDecision {
    pub fn linked(&self) -> bool {
        self.transition.is_linked()
    }
}

/// Scores pairs and applies link transitions
pub struct LinkReconciler {
    scorer: Arc<dyn PatientSimilarity>,
    threshold: f32,
    timeout: Duration,
}

impl LinkReconciler {
    pub fn new(scorer: Arc<dyn PatientSimilarity>, threshold: f32, timeout: Duration) -> Self {
        Self {
            scorer,
            threshold,
            timeout,
        }
    }

    /// Score a pair within the bounded wait
    ///
    /// # Errors
    /// [`LinkerError::Scoring`] naming both records on timeout or fault.
    pub async fn score(&self, central: &PatientRecord, remote: &PatientRecord) -> LinkerResult<f32> {
        let score = score_within(self.scorer.as_ref(), central, remote, self.timeout)
            .await
            .map_err(|source| LinkerError::Scoring {
                central: central.name_id_str(),
                remote: remote.name_id_str(),
                source,
            })?;

        tracing::debug!(
            scorer = self.scorer.name(),
            central = %central.name_id_str(),
            remote = %remote.name_id_str(),
            score,
            "Similarity computed"
        );
        Ok(score)
    }

    /// Apply the transition for an already computed score
    pub fn apply(
        &self,
        candidate: &PatientRecord,
        remote_id: &ResourceId,
        score: f32,
        changes: &mut ChangeSet,
    ) -> LinkDecision {
        let mut working = changes.working_copy(candidate);
        let existing = working.links.iter().filter(|l| l.refers_to(remote_id)).count();
        let before = if existing > 0 {
            LinkState::Linked
        } else {
            LinkState::NotLinked
        };
        let after = decide(before, score >= self.threshold);

        let transition = match (before, after) {
            (LinkState::NotLinked, LinkState::Linked) => {
                working.links.push(LinkAnnotation::see_also(remote_id));
                LinkTransition::Added
            }
            (LinkState::Linked, LinkState::Linked) if existing > 1 => {
                // Keep the first annotation in place, drop later duplicates
                let mut seen = false;
                working.links.retain(|l| !l.refers_to(remote_id) || !std::mem::replace(&mut seen, true));
                LinkTransition::Deduplicated {
                    removed: existing - 1,
                }
            }
            (LinkState::Linked, LinkState::Linked) => LinkTransition::Kept,
            (LinkState::Linked, LinkState::NotLinked) => LinkTransition::Removed {
                removed: working.remove_links_to(remote_id),
            },
            (LinkState::NotLinked, LinkState::NotLinked) => LinkTransition::Unchanged,
        };

        let central = working.id.clone();
        if transition.mutates() {
            changes.mark_changed(working);
        }

        match transition {
            LinkTransition::Added => tracing::info!(
                central = ?central.as_ref().map(ResourceId::qualified),
                remote = %remote_id.qualified(),
                score,
                "Adding link"
            ),
            LinkTransition::Removed { removed } => tracing::info!(
                central = ?central.as_ref().map(ResourceId::qualified),
                remote = %remote_id.qualified(),
                score,
                removed,
                "Removing link"
            ),
            _ => tracing::info!(
                central = ?central.as_ref().map(ResourceId::qualified),
                remote = %remote_id.qualified(),
                score,
                linked = transition.is_linked(),
                "Link state unchanged"
            ),
        }

        LinkDecision {
            central,
            remote: remote_id.unqualified_versionless(),
            score,
            before,
            transition,
        }
    }

    /// Score and apply in one step
    pub async fn reconcile(
        &self,
        candidate: &PatientRecord,
        remote: &PatientRecord,
        remote_id: &ResourceId,
        changes: &mut ChangeSet,
    ) -> LinkerResult<LinkDecision> {
        let score = self.score(candidate, remote).await?;
        Ok(self.apply(candidate, remote_id, score, changes))
    }
}
