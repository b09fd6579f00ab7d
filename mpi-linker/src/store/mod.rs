//! Record store interface
//!
//! The linker never talks to a concrete backend directly. Search, read and
//! write all go through [`RecordStore`], so a FHIR server client, a database
//! adapter or the bundled [`InMemoryStore`] can be swapped in.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use mpi_common::{Organization, PatientRecord, ResourceId};
use thiserror::Error;

/// Store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Update carried a stale version
    #[error("Version conflict on {id}: expected {expected}, found {found}")]
    Conflict {
        id: String,
        expected: String,
        found: String,
    },

    /// Record refused by the store
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Operation not offered by this store
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Backend failure (transport, storage, ...)
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Search predicate on patient records
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPredicate {
    /// Record has a link annotation whose target matches this id
    LinkTarget(String),
    /// Any name part contains any of these tokens (case-insensitive)
    NameContains(Vec<String>),
    /// Birth date equals this day exactly
    BirthDate(NaiveDate),
    /// Managing organization reference matches this id
    ManagingOrganization(String),
}

/// Which predicate kinds a store can evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateKind {
    LinkTarget,
    NameContains,
    BirthDate,
    ManagingOrganization,
}

impl SearchPredicate {
    pub fn kind(&self) -> PredicateKind {
        match self {
            Self::LinkTarget(_) => PredicateKind::LinkTarget,
            Self::NameContains(_) => PredicateKind::NameContains,
            Self::BirthDate(_) => PredicateKind::BirthDate,
            Self::ManagingOrganization(_) => PredicateKind::ManagingOrganization,
        }
    }
}

/// Cache behaviour requested for a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    Default,
    /// Always read fresh results
    NoCache,
}

/// Patient search (all predicates must hold)
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub predicates: Vec<SearchPredicate>,
    pub cache: CacheDirective,
    pub limit: usize,
}

impl SearchRequest {
    pub fn new(limit: usize) -> Self {
        Self {
            predicates: Vec::new(),
            cache: CacheDirective::Default,
            limit,
        }
    }

    pub fn with(mut self, predicate: SearchPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.cache = CacheDirective::NoCache;
        self
    }
}

/// Kind of write issued for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOperation {
    Create,
    Update,
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub operation: WriteOperation,
    /// Id (with new version) assigned by the store
    pub id: ResourceId,
}

/// Remote record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Search patient records
    async fn search_patients(&self, request: &SearchRequest) -> Result<Vec<PatientRecord>, StoreError>;

    /// Read one patient record
    async fn read_patient(&self, id: &ResourceId) -> Result<Option<PatientRecord>, StoreError>;

    /// Read one organization
    async fn read_organization(&self, id: &ResourceId) -> Result<Option<Organization>, StoreError>;

    /// Persist a record that has no id yet
    async fn create(&self, record: PatientRecord) -> Result<WriteOutcome, StoreError>;

    /// Replace an existing record
    async fn update(&self, record: PatientRecord) -> Result<WriteOutcome, StoreError>;

    /// Apply creates/updates atomically; all or nothing
    async fn transact(&self, records: Vec<PatientRecord>) -> Result<Vec<WriteOutcome>, StoreError>;

    /// Whether [`RecordStore::transact`] is available
    fn supports_transactions(&self) -> bool;

    /// Whether searches can evaluate this predicate kind
    fn supports_predicate(&self, kind: PredicateKind) -> bool;
}
