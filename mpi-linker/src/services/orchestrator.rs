//! Reconciliation orchestrator
//!
//! Entry point for one changed remote record.
//!
//! **Run:**
//! 1. Ignore the event when the record has no resolvable managing
//!    organization, already belongs to the central organization, or has no id
//! 2. Reconcile every central record already linked to it (all of them, so
//!    stale links are retracted)
//! 3. If nothing is linked, reconcile the similar central records
//! 4. If still nothing is linked, create one new master record
//! 5. Commit the change set
//!
//! Scoring within a phase may run concurrently; link mutations are applied
//! one candidate at a time afterwards.

use super::candidate_source::CandidateSource;
use super::change_batch::{ChangeBatchCommitter, ChangeSet, CommitOutcome};
use super::link_reconciler::{LinkDecision, LinkReconciler};
use super::master_creator::MasterCreator;
use crate::error::{LinkerError, LinkerResult};
use crate::organization::OrganizationResolver;
use crate::similarity::PatientSimilarity;
use crate::store::{RecordStore, StoreError};
use futures::future::try_join_all;
use mpi_common::config::LinkerSettings;
use mpi_common::{PatientRecord, ResourceId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Kind of change that triggered a run; logged, not branched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Why an event was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    NoManagingOrganization,
    UnknownOrganization,
    CentralOrganization,
    Unidentified,
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunReport {
    /// Nothing to reconcile; no store writes
    Ignored { reason: IgnoreReason },
    Reconciled {
        linked: bool,
        master_created: bool,
        decisions: Vec<LinkDecision>,
        outcomes: Vec<CommitOutcome>,
    },
}

impl RunReport {
    pub fn outcomes(&self) -> &[CommitOutcome] {
        match self {
            Self::Reconciled { outcomes, .. } => outcomes,
            Self::Ignored { .. } => &[],
        }
    }

    pub fn master_created(&self) -> bool {
        matches!(self, Self::Reconciled { master_created: true, .. })
    }
}

/// Top-level reconciliation service
pub struct ReconciliationOrchestrator {
    organizations: Arc<dyn OrganizationResolver>,
    candidates: CandidateSource,
    reconciler: LinkReconciler,
    creator: MasterCreator,
    committer: ChangeBatchCommitter,
    concurrent_scoring: bool,
    stop_after_first_link: bool,
}

impl ReconciliationOrchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        organizations: Arc<dyn OrganizationResolver>,
        scorer: Arc<dyn PatientSimilarity>,
        settings: &LinkerSettings,
    ) -> Self {
        Self {
            candidates: CandidateSource::new(store.clone(), organizations.clone(), settings.search_limit),
            reconciler: LinkReconciler::new(scorer, settings.similarity_threshold, settings.scoring_timeout()),
            creator: MasterCreator::new(organizations.clone()),
            committer: ChangeBatchCommitter::new(store, settings.commit_mode),
            organizations,
            concurrent_scoring: settings.concurrent_scoring,
            stop_after_first_link: settings.stop_after_first_link,
        }
    }

    pub fn candidates(&self) -> &CandidateSource {
        &self.candidates
    }

    /// Reconcile one changed remote record
    pub async fn handle(&self, remote: &PatientRecord, event: EventKind) -> LinkerResult<RunReport> {
        tracing::debug!(event = %event, remote = %remote.name_id_str(), "Patient event received");

        let remote_id = match self.check_relevance(remote).await? {
            Ok(id) => id,
            Err(reason) => {
                tracing::info!(
                    event = %event,
                    remote = %remote.name_id_str(),
                    reason = ?reason,
                    "Ignoring event for patient"
                );
                return Ok(RunReport::Ignored { reason });
            }
        };

        let mut changes = ChangeSet::new();
        let mut decisions = Vec::new();

        let linked_centrals = self
            .candidates
            .find_linked_centrals(remote)
            .await
            .map_err(|e| discovery(remote, e))?;
        let mut linked = self
            .reconcile_phase(&linked_centrals, remote, &remote_id, false, &mut changes, &mut decisions)
            .await?;
        tracing::info!(
            remote = %remote.name_id_str(),
            candidates = linked_centrals.len(),
            linked,
            "Checked linked central records"
        );

        if !linked {
            let similar = self
                .candidates
                .find_similar_centrals(remote)
                .await
                .map_err(|e| discovery(remote, e))?;
            linked = self
                .reconcile_phase(
                    &similar,
                    remote,
                    &remote_id,
                    self.stop_after_first_link,
                    &mut changes,
                    &mut decisions,
                )
                .await?;
        }

        let master_created = !linked;
        if master_created {
            self.creator.create_central(remote, &remote_id, &mut changes);
        }

        if changes.is_empty() {
            tracing::info!(remote = %remote.name_id_str(), "Nothing changed for patient");
        } else {
            tracing::debug!(
                remote = %remote.name_id_str(),
                records = changes.len(),
                new = changes.new_records().count(),
                "Change set ready"
            );
        }
        let outcomes = self.committer.commit(changes).await?;

        Ok(RunReport::Reconciled {
            linked,
            master_created,
            decisions,
            outcomes,
        })
    }

    /// Remote id when the event needs reconciling, otherwise the reason to ignore it
    async fn check_relevance(&self, remote: &PatientRecord) -> LinkerResult<Result<ResourceId, IgnoreReason>> {
        let Some(reference) = remote.managing_organization.as_ref() else {
            return Ok(Err(IgnoreReason::NoManagingOrganization));
        };
        let organization = self
            .organizations
            .load_from_reference(reference)
            .await
            .map_err(|e| discovery(remote, e))?;

        let Some(organization) = organization else {
            return Ok(Err(IgnoreReason::UnknownOrganization));
        };
        if self.organizations.is_central(&organization) {
            return Ok(Err(IgnoreReason::CentralOrganization));
        }
        match &remote.id {
            Some(id) => Ok(Ok(id.unqualified_versionless())),
            None => Ok(Err(IgnoreReason::Unidentified)),
        }
    }

    /// Reconcile one phase's candidates, returning whether any ended linked
    async fn reconcile_phase(
        &self,
        candidates: &[PatientRecord],
        remote: &PatientRecord,
        remote_id: &ResourceId,
        stop_at_first_link: bool,
        changes: &mut ChangeSet,
        decisions: &mut Vec<LinkDecision>,
    ) -> LinkerResult<bool> {
        let mut linked = false;

        if self.concurrent_scoring {
            let scores = try_join_all(candidates.iter().map(|c| self.reconciler.score(c, remote))).await?;
            for (candidate, score) in candidates.iter().zip(scores) {
                if stop_at_first_link && linked {
                    break;
                }
                let decision = self.reconciler.apply(candidate, remote_id, score, changes);
                linked |= decision.linked();
                decisions.push(decision);
            }
        } else {
            for candidate in candidates {
                if stop_at_first_link && linked {
                    break;
                }
                let decision = self
                    .reconciler
                    .reconcile(candidate, remote, remote_id, changes)
                    .await?;
                linked |= decision.linked();
                decisions.push(decision);
            }
        }

        Ok(linked)
    }
}

fn discovery(remote: &PatientRecord, source: StoreError) -> LinkerError {
    LinkerError::Discovery {
        remote: remote.name_id_str(),
        source,
    }
}
