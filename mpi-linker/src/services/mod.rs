//! Reconciliation services

pub mod candidate_source;
pub mod change_batch;
pub mod link_reconciler;
pub mod master_creator;
pub mod orchestrator;

pub use candidate_source::{CandidateSource, LinkedRecord};
pub use change_batch::{ChangeBatchCommitter, ChangeKey, ChangeSet, CommitOutcome, CommitStatus};
pub use link_reconciler::{LinkDecision, LinkReconciler, LinkState, LinkTransition};
pub use master_creator::MasterCreator;
pub use orchestrator::{EventKind, IgnoreReason, ReconciliationOrchestrator, RunReport};
