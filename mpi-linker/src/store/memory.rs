//! In-memory record store
//!
//! Backs the command-line driver (loaded from a JSON snapshot) and the test
//! suite. Behaves like a versioned FHIR server for the operations the linker
//! uses: ids are assigned on create, every write bumps `meta.versionId`, and an
//! update carrying a stale version is refused with [`StoreError::Conflict`].

use super::{
    PredicateKind, RecordStore, SearchPredicate, SearchRequest, StoreError, WriteOperation,
    WriteOutcome,
};
use async_trait::async_trait;
use mpi_common::model::{Meta, PATIENT_KIND};
use mpi_common::{Organization, PatientRecord, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// On-disk snapshot format
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub patients: Vec<PatientRecord>,
}

#[derive(Debug, Default)]
struct State {
    patients: BTreeMap<String, PatientRecord>,
    organizations: BTreeMap<String, Organization>,
    next_id: u64,
    failing_ids: HashSet<String>,
    fail_creates: bool,
}

/// Versioned in-memory patient store
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
    transactions: bool,
    writes: AtomicUsize,
    searches: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Empty store with transaction support
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_id: 1,
                ..Default::default()
            }),
            transactions: true,
            writes: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
        }
    }

    /// Empty store without transaction support
    pub fn without_transactions() -> Self {
        Self {
            transactions: false,
            ..Self::new()
        }
    }

    /// Build a store from a snapshot
    pub async fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        for org in snapshot.organizations {
            store.insert_organization(org).await;
        }
        for patient in snapshot.patients {
            store.insert_patient(patient).await;
        }
        store
    }

    /// Load a JSON snapshot file
    pub async fn load_snapshot(path: &Path) -> mpi_common::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            patients = snapshot.patients.len(),
            organizations = snapshot.organizations.len(),
            "Loaded store snapshot"
        );
        Ok(Self::from_snapshot(snapshot).await)
    }

    /// Write the current contents as a JSON snapshot
    pub async fn save_snapshot(&self, path: &Path) -> mpi_common::Result<()> {
        let snapshot = {
            let state = self.state.read().await;
            Snapshot {
                organizations: state.organizations.values().cloned().collect(),
                patients: state.patients.values().cloned().collect(),
            }
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Seed a patient, keeping its id when it has one
    pub async fn insert_patient(&self, mut record: PatientRecord) -> ResourceId {
        let mut state = self.state.write().await;
        let id = match record.id.take() {
            Some(id) => id.unqualified_versionless(),
            None => state.allocate_id(),
        };
        if let Ok(n) = id.id_part().parse::<u64>() {
            state.next_id = state.next_id.max(n + 1);
        }
        record.id = Some(id.clone());
        if record.version_id().is_none() {
            record.meta = Some(Meta {
                version_id: Some("1".to_string()),
            });
        }
        state.patients.insert(id.qualified(), record);
        id
    }

    pub async fn insert_organization(&self, org: Organization) {
        let mut state = self.state.write().await;
        state.organizations.insert(org.id.qualified(), org);
    }

    /// Current stored copy of a patient
    pub async fn patient(&self, id: &ResourceId) -> Option<PatientRecord> {
        self.state.read().await.patients.get(&id.qualified()).cloned()
    }

    /// All stored patients in id order
    pub async fn patients(&self) -> Vec<PatientRecord> {
        self.state.read().await.patients.values().cloned().collect()
    }

    /// Make every write to `id` fail with [`StoreError::Backend`]
    pub async fn fail_writes_to(&self, id: &ResourceId) {
        self.state.write().await.failing_ids.insert(id.qualified());
    }

    /// Make every create fail with [`StoreError::Backend`]
    pub async fn fail_creates(&self) {
        self.state.write().await.fail_creates = true;
    }

    /// Number of records written so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of searches executed so far
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl State {
    fn allocate_id(&mut self) -> ResourceId {
        loop {
            let candidate = self.next_id;
            self.next_id += 1;
            // Ids are digits only, so construction cannot fail
            if let Ok(id) = ResourceId::new(PATIENT_KIND, candidate.to_string()) {
                if !self.patients.contains_key(&id.qualified()) {
                    return id;
                }
            }
        }
    }

    /// Check a write without applying it
    fn check(&self, record: &PatientRecord) -> Result<WriteOperation, StoreError> {
        match &record.id {
            None => {
                if self.fail_creates {
                    return Err(StoreError::Backend("create refused by store".to_string()));
                }
                Ok(WriteOperation::Create)
            }
            Some(id) => {
                let key = id.qualified();
                if self.failing_ids.contains(&key) {
                    return Err(StoreError::Backend(format!("write to {} refused by store", key)));
                }
                let stored = self
                    .patients
                    .get(&key)
                    .ok_or_else(|| StoreError::NotFound(key.clone()))?;
                if let (Some(expected), Some(found)) = (record.version_id(), stored.version_id()) {
                    if expected != found {
                        return Err(StoreError::Conflict {
                            id: key,
                            expected: expected.to_string(),
                            found: found.to_string(),
                        });
                    }
                }
                Ok(WriteOperation::Update)
            }
        }
    }

    /// Apply a previously checked write
    fn apply(&mut self, mut record: PatientRecord, operation: WriteOperation) -> WriteOutcome {
        let (id, version) = match operation {
            WriteOperation::Create => (self.allocate_id(), 1),
            WriteOperation::Update => {
                let id = record
                    .id
                    .as_ref()
                    .map(ResourceId::unqualified_versionless)
                    .unwrap_or_else(|| self.allocate_id());
                let next = self
                    .patients
                    .get(&id.qualified())
                    .and_then(|p| p.version_id())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0)
                    + 1;
                (id, next)
            }
        };
        record.id = Some(id.clone());
        record.meta = Some(Meta {
            version_id: Some(version.to_string()),
        });
        self.patients.insert(id.qualified(), record);
        WriteOutcome {
            operation,
            id: id.with_version(version.to_string()),
        }
    }
}

fn record_matches(record: &PatientRecord, predicate: &SearchPredicate) -> bool {
    match predicate {
        SearchPredicate::LinkTarget(target) => {
            match ResourceId::parse_with_kind(target, PATIENT_KIND) {
                Ok(id) => record.is_linked_to(&id),
                Err(_) => record.links.iter().any(|l| {
                    l.other
                        .reference
                        .as_deref()
                        .map(|r| r.ends_with(target.as_str()))
                        .unwrap_or(false)
                }),
            }
        }
        SearchPredicate::NameContains(tokens) => {
            let tokens: Vec<String> = tokens
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            record.names.iter().any(|name| {
                name.given
                    .iter()
                    .map(String::as_str)
                    .chain(name.family.as_deref())
                    .map(str::to_lowercase)
                    .any(|part| tokens.iter().any(|t| part.contains(t.as_str())))
            })
        }
        SearchPredicate::BirthDate(day) => record.birth_date_day() == Some(*day),
        SearchPredicate::ManagingOrganization(_) => false,
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn search_patients(&self, request: &SearchRequest) -> Result<Vec<PatientRecord>, StoreError> {
        if let Some(p) = request
            .predicates
            .iter()
            .find(|p| !self.supports_predicate(p.kind()))
        {
            return Err(StoreError::Unsupported(format!("search predicate {:?}", p.kind())));
        }
        self.searches.fetch_add(1, Ordering::SeqCst);

        let state = self.state.read().await;
        Ok(state
            .patients
            .values()
            .filter(|record| request.predicates.iter().all(|p| record_matches(record, p)))
            .take(request.limit)
            .cloned()
            .collect())
    }

    async fn read_patient(&self, id: &ResourceId) -> Result<Option<PatientRecord>, StoreError> {
        Ok(self.patient(id).await)
    }

    async fn read_organization(&self, id: &ResourceId) -> Result<Option<Organization>, StoreError> {
        Ok(self.state.read().await.organizations.get(&id.qualified()).cloned())
    }

    async fn create(&self, record: PatientRecord) -> Result<WriteOutcome, StoreError> {
        if record.id.is_some() {
            return Err(StoreError::Rejected("create requires a record without id".to_string()));
        }
        let mut state = self.state.write().await;
        let operation = state.check(&record)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(state.apply(record, operation))
    }

    async fn update(&self, record: PatientRecord) -> Result<WriteOutcome, StoreError> {
        if record.id.is_none() {
            return Err(StoreError::Rejected("update requires a record id".to_string()));
        }
        let mut state = self.state.write().await;
        let operation = state.check(&record)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(state.apply(record, operation))
    }

    async fn transact(&self, records: Vec<PatientRecord>) -> Result<Vec<WriteOutcome>, StoreError> {
        if !self.transactions {
            return Err(StoreError::Unsupported("transactions".to_string()));
        }
        let mut state = self.state.write().await;

        let mut seen = HashSet::new();
        let mut operations = Vec::with_capacity(records.len());
        for record in &records {
            if let Some(id) = &record.id {
                if !seen.insert(id.qualified()) {
                    return Err(StoreError::Rejected(format!(
                        "{} appears twice in one transaction",
                        id.qualified()
                    )));
                }
            }
            operations.push(state.check(record)?);
        }

        self.writes.fetch_add(records.len(), Ordering::SeqCst);
        Ok(records
            .into_iter()
            .zip(operations)
            .map(|(record, operation)| state.apply(record, operation))
            .collect())
    }

    fn supports_transactions(&self) -> bool {
        self.transactions
    }

    fn supports_predicate(&self, kind: PredicateKind) -> bool {
        !matches!(kind, PredicateKind::ManagingOrganization)
    }
}
