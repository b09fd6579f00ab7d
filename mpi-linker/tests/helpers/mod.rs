//! Shared fixtures for reconciliation integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mpi_common::config::LinkerSettings;
use mpi_common::{
    AdministrativeGender, HumanName, NameUse, Organization, PatientRecord, Reference, ResourceId,
};
use mpi_linker::organization::StoreOrganizationResolver;
use mpi_linker::similarity::{PatientSimilarity, ScoringError};
use mpi_linker::store::{
    InMemoryStore, PredicateKind, RecordStore, SearchPredicate, SearchRequest, StoreError,
    WriteOutcome,
};
use mpi_linker::ReconciliationOrchestrator;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CENTRAL: &str = "Organization/central";
pub const CLINIC_A: &str = "Organization/clinic-a";
pub const CLINIC_B: &str = "Organization/clinic-b";

pub fn id(value: &str) -> ResourceId {
    value.parse().unwrap()
}

/// Female patient with one official name
pub fn patient(id: Option<&str>, org: &str, given: &str, family: &str, birth: &str) -> PatientRecord {
    PatientRecord {
        id: id.map(|s| s.parse().unwrap()),
        names: vec![HumanName::new(Some(NameUse::Official), &[given], family)],
        gender: Some(AdministrativeGender::Female),
        birth_date: Some(birth.to_string()),
        managing_organization: Some(Reference {
            reference: Some(org.to_string()),
            display: None,
        }),
        ..Default::default()
    }
}

/// Similarity fake returning scripted scores per central record
///
/// Scores are keyed by the central record's qualified id (`"new"` for records
/// without one). A scripted sequence is consumed front to back; its last value
/// sticks. Unscripted pairs get the default score.
pub struct ScriptedSimilarity {
    scores: Mutex<HashMap<String, VecDeque<f32>>>,
    default: f32,
    delay: Option<Duration>,
    failure: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSimilarity {
    pub fn new(default: f32) -> Self {
        Self {
            scores: Mutex::new(HashMap::new()),
            default,
            delay: None,
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call sleeps this long before answering
    pub fn stalled(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(1.0)
        }
    }

    /// Every call fails
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(1.0)
        }
    }

    pub fn set(&self, central: &str, score: f32) {
        self.script(central, &[score]);
    }

    pub fn script(&self, central: &str, scores: &[f32]) {
        self.scores
            .lock()
            .unwrap()
            .insert(central.to_string(), scores.iter().copied().collect());
    }

    /// Central ids scored so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_score(&self, key: &str) -> f32 {
        let mut scores = self.scores.lock().unwrap();
        match scores.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(self.default),
            Some(queue) => queue.front().copied().unwrap_or(self.default),
            None => self.default,
        }
    }
}

#[async_trait]
impl PatientSimilarity for ScriptedSimilarity {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn similarity(&self, a: &PatientRecord, _b: &PatientRecord) -> Result<f32, ScoringError> {
        let key = a
            .id
            .as_ref()
            .map(ResourceId::qualified)
            .unwrap_or_else(|| "new".to_string());
        self.calls.lock().unwrap().push(key.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(ScoringError::Failed(message.clone()));
        }
        Ok(self.next_score(&key))
    }
}

/// Store whose searches always fail; everything else delegates
pub struct UnreachableSearchStore {
    pub inner: Arc<InMemoryStore>,
}

#[async_trait]
impl RecordStore for UnreachableSearchStore {
    async fn search_patients(&self, _request: &SearchRequest) -> Result<Vec<PatientRecord>, StoreError> {
        Err(StoreError::Backend("connection reset by peer".to_string()))
    }

    async fn read_patient(&self, id: &ResourceId) -> Result<Option<PatientRecord>, StoreError> {
        self.inner.read_patient(id).await
    }

    async fn read_organization(&self, id: &ResourceId) -> Result<Option<Organization>, StoreError> {
        self.inner.read_organization(id).await
    }

    async fn create(&self, record: PatientRecord) -> Result<WriteOutcome, StoreError> {
        self.inner.create(record).await
    }

    async fn update(&self, record: PatientRecord) -> Result<WriteOutcome, StoreError> {
        self.inner.update(record).await
    }

    async fn transact(&self, records: Vec<PatientRecord>) -> Result<Vec<WriteOutcome>, StoreError> {
        self.inner.transact(records).await
    }

    fn supports_transactions(&self) -> bool {
        self.inner.supports_transactions()
    }

    fn supports_predicate(&self, kind: PredicateKind) -> bool {
        self.inner.supports_predicate(kind)
    }
}

/// Store that records every search request before delegating
///
/// With `filters_by_organization` set it claims support for the managing
/// organization predicate and strips it before the in-memory store sees it.
pub struct RecordingStore {
    pub inner: Arc<InMemoryStore>,
    filters_by_organization: bool,
    requests: Mutex<Vec<SearchRequest>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<InMemoryStore>, filters_by_organization: bool) -> Self {
        Self {
            inner,
            filters_by_organization,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn search_patients(&self, request: &SearchRequest) -> Result<Vec<PatientRecord>, StoreError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut forwarded = request.clone();
        forwarded
            .predicates
            .retain(|p| !matches!(p, SearchPredicate::ManagingOrganization(_)));
        self.inner.search_patients(&forwarded).await
    }

    async fn read_patient(&self, id: &ResourceId) -> Result<Option<PatientRecord>, StoreError> {
        self.inner.read_patient(id).await
    }

    async fn read_organization(&self, id: &ResourceId) -> Result<Option<Organization>, StoreError> {
        self.inner.read_organization(id).await
    }

    async fn create(&self, record: PatientRecord) -> Result<WriteOutcome, StoreError> {
        self.inner.create(record).await
    }

    async fn update(&self, record: PatientRecord) -> Result<WriteOutcome, StoreError> {
        self.inner.update(record).await
    }

    async fn transact(&self, records: Vec<PatientRecord>) -> Result<Vec<WriteOutcome>, StoreError> {
        self.inner.transact(records).await
    }

    fn supports_transactions(&self) -> bool {
        self.inner.supports_transactions()
    }

    fn supports_predicate(&self, kind: PredicateKind) -> bool {
        match kind {
            PredicateKind::ManagingOrganization => self.filters_by_organization,
            other => self.inner.supports_predicate(other),
        }
    }
}

/// Registry with a central organization and two source clinics
pub struct Registry {
    pub store: Arc<InMemoryStore>,
    pub scorer: Arc<ScriptedSimilarity>,
}

impl Registry {
    pub async fn new(scorer: ScriptedSimilarity) -> Self {
        Self::with_store(InMemoryStore::new(), scorer).await
    }

    pub async fn with_store(store: InMemoryStore, scorer: ScriptedSimilarity) -> Self {
        store
            .insert_organization(Organization::new(id(CENTRAL), Some("Central Registry".into())))
            .await;
        store
            .insert_organization(Organization::new(id(CLINIC_A), Some("Clinic A".into())))
            .await;
        store
            .insert_organization(Organization::new(id(CLINIC_B), Some("Clinic B".into())))
            .await;
        Self {
            store: Arc::new(store),
            scorer: Arc::new(scorer),
        }
    }

    pub fn settings() -> LinkerSettings {
        LinkerSettings::default()
    }

    pub fn resolver(&self) -> StoreOrganizationResolver {
        StoreOrganizationResolver::new(
            self.store.clone(),
            Organization::new(id(CENTRAL), Some("Central Registry".into())),
        )
    }

    pub fn orchestrator(&self) -> ReconciliationOrchestrator {
        self.orchestrator_with(Self::settings())
    }

    pub fn orchestrator_with(&self, settings: LinkerSettings) -> ReconciliationOrchestrator {
        self.orchestrator_over(self.store.clone(), settings)
    }

    /// Orchestrator over another store sharing this registry's resolver and scorer
    pub fn orchestrator_over(&self, store: Arc<dyn RecordStore>, settings: LinkerSettings) -> ReconciliationOrchestrator {
        ReconciliationOrchestrator::new(
            store,
            Arc::new(self.resolver()),
            self.scorer.clone(),
            &settings,
        )
    }

    /// Seed a record and return its stored copy
    pub async fn seed(&self, record: PatientRecord) -> PatientRecord {
        let id = self.store.insert_patient(record).await;
        self.store.patient(&id).await.unwrap()
    }

    pub async fn stored(&self, value: &str) -> PatientRecord {
        self.store.patient(&id(value)).await.unwrap()
    }

    /// Stored records owned by the central organization
    pub async fn centrals(&self) -> Vec<PatientRecord> {
        self.store
            .patients()
            .await
            .into_iter()
            .filter(|p| {
                p.managing_organization
                    .as_ref()
                    .and_then(|r| r.reference.as_deref())
                    == Some(CENTRAL)
            })
            .collect()
    }
}
