//! Change set and batch committer
//!
//! Records mutated during a run are collected in a [`ChangeSet`] keyed by
//! resource identity, so two mutations of the same central record end up as
//! one write. Records without an id are always distinct entries; each one is
//! a new master record.

use crate::error::{LinkerError, LinkerResult};
use crate::store::{RecordStore, WriteOperation};
use mpi_common::config::CommitMode;
use mpi_common::{PatientRecord, ResourceId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of a change set entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKey {
    /// Persisted record, keyed by its unqualified versionless id
    Existing(String),
    /// Not yet persisted record, keyed by a synthetic run-local id
    New(Uuid),
}

impl ChangeKey {
    pub fn for_id(id: &ResourceId) -> Self {
        Self::Existing(id.unqualified_versionless().qualified())
    }
}

/// Records requiring a write at the end of a run
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    entries: BTreeMap<ChangeKey, PatientRecord>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of `candidate` with every mutation already recorded for it in this run
    pub fn working_copy(&self, candidate: &PatientRecord) -> PatientRecord {
        candidate
            .id
            .as_ref()
            .and_then(|id| self.entries.get(&ChangeKey::for_id(id)))
            .unwrap_or(candidate)
            .clone()
    }

    /// Record `record` as changed, replacing any earlier copy with the same id
    pub fn mark_changed(&mut self, record: PatientRecord) -> ChangeKey {
        let key = match &record.id {
            Some(id) => ChangeKey::for_id(id),
            None => ChangeKey::New(Uuid::new_v4()),
        };
        self.entries.insert(key.clone(), record);
        key
    }

    pub fn get(&self, id: &ResourceId) -> Option<&PatientRecord> {
        self.entries.get(&ChangeKey::for_id(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that will be created rather than updated
    pub fn new_records(&self) -> impl Iterator<Item = &PatientRecord> {
        self.entries
            .iter()
            .filter(|(k, _)| matches!(k, ChangeKey::New(_)))
            .map(|(_, r)| r)
    }

    pub fn into_records(self) -> Vec<PatientRecord> {
        self.entries.into_values().collect()
    }
}

/// Per-record result of a commit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitOutcome {
    pub operation: WriteOperation,
    /// Id of the updated record; `None` for creates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ResourceId>,
    pub status: CommitStatus,
}

/// Whether a single write went through
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    /// Written; carries the id and version assigned by the store
    Written(ResourceId),
    Failed(String),
}

impl CommitOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self.status, CommitStatus::Written(_))
    }
}

/// Writes a change set back to the store
pub struct ChangeBatchCommitter {
    store: Arc<dyn RecordStore>,
    mode: CommitMode,
}

impl ChangeBatchCommitter {
    pub fn new(store: Arc<dyn RecordStore>, mode: CommitMode) -> Self {
        Self { store, mode }
    }

    /// Persist every entry: create when it has no id, update otherwise
    ///
    /// **Modes:**
    /// - Transaction: one atomic write; any failure fails the whole batch
    /// - Best effort: one call per record; failures are reported per outcome
    ///   and never stop the remaining writes
    /// - Auto: transaction when the store supports it
    ///
    /// An empty change set issues no store call.
    pub async fn commit(&self, changes: ChangeSet) -> LinkerResult<Vec<CommitOutcome>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let transactional = match self.mode {
            CommitMode::Transaction => true,
            CommitMode::BestEffort => false,
            CommitMode::Auto => self.store.supports_transactions(),
        };

        if transactional {
            self.commit_transaction(changes.into_records()).await
        } else {
            Ok(self.commit_best_effort(changes.into_records()).await)
        }
    }

    async fn commit_transaction(&self, records: Vec<PatientRecord>) -> LinkerResult<Vec<CommitOutcome>> {
        let targets: Vec<Option<ResourceId>> = records.iter().map(|r| r.id.clone()).collect();
        tracing::info!(records = records.len(), "Committing change set as one transaction");

        let written = self
            .store
            .transact(records)
            .await
            .map_err(LinkerError::Commit)?;

        let outcomes: Vec<CommitOutcome> = written
            .into_iter()
            .zip(targets)
            .map(|(w, target)| CommitOutcome {
                operation: w.operation,
                target,
                status: CommitStatus::Written(w.id),
            })
            .collect();

        for outcome in &outcomes {
            log_outcome(outcome);
        }
        Ok(outcomes)
    }

    async fn commit_best_effort(&self, records: Vec<PatientRecord>) -> Vec<CommitOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());

        for record in records {
            let target = record.id.clone();
            let (operation, result) = match target {
                None => (WriteOperation::Create, self.store.create(record).await),
                Some(_) => (WriteOperation::Update, self.store.update(record).await),
            };

            let outcome = CommitOutcome {
                operation,
                target,
                status: match result {
                    Ok(w) => CommitStatus::Written(w.id),
                    Err(e) => CommitStatus::Failed(e.to_string()),
                },
            };
            log_outcome(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }
}

fn log_outcome(outcome: &CommitOutcome) {
    match (&outcome.status, outcome.operation) {
        (CommitStatus::Written(id), WriteOperation::Create) => {
            tracing::info!(id = %id, "Created master record");
        }
        (CommitStatus::Written(id), WriteOperation::Update) => {
            tracing::info!(id = %id, "Updated central record");
        }
        (CommitStatus::Failed(error), operation) => {
            tracing::error!(
                operation = ?operation,
                target = ?outcome.target.as_ref().map(ResourceId::qualified),
                error = %error,
                "Write failed"
            );
        }
    }
}
