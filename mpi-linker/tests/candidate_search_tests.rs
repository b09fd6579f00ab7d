//! Search requests issued while discovering central candidates

mod helpers;

use chrono::NaiveDate;
use helpers::*;
use mpi_common::config::LinkerSettings;
use mpi_linker::store::{CacheDirective, SearchPredicate};
use mpi_linker::EventKind;
use std::sync::Arc;

fn remote() -> mpi_common::PatientRecord {
    patient(
        Some("https://clinic-a.example/fhir/Patient/100/_history/2"),
        CLINIC_A,
        "Jane",
        "Doe",
        "1980-04-02",
    )
}

#[tokio::test]
async fn test_searches_bypass_cache_and_respect_limit() {
    let registry = Registry::new(ScriptedSimilarity::new(0.1)).await;
    registry.seed(patient(Some("Patient/1"), CENTRAL, "Jane", "Doe", "1980-04-02")).await;
    let store = Arc::new(RecordingStore::new(registry.store.clone(), false));
    let settings = LinkerSettings {
        search_limit: 25,
        ..Registry::settings()
    };

    registry
        .orchestrator_over(store.clone(), settings)
        .handle(&remote(), EventKind::Update)
        .await
        .unwrap();

    let requests = store.requests();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.cache, CacheDirective::NoCache);
        assert_eq!(request.limit, 25);
    }
    assert_eq!(
        requests[0].predicates,
        vec![SearchPredicate::LinkTarget("Patient/100".to_string())]
    );
    assert_eq!(
        requests[1].predicates,
        vec![
            SearchPredicate::NameContains(vec!["Jane".to_string(), "Doe".to_string()]),
            SearchPredicate::BirthDate(NaiveDate::from_ymd_opt(1980, 4, 2).unwrap()),
        ]
    );
}

#[tokio::test]
async fn test_organization_predicate_added_when_supported() {
    let registry = Registry::new(ScriptedSimilarity::new(0.1)).await;
    let store = Arc::new(RecordingStore::new(registry.store.clone(), true));

    registry
        .orchestrator_over(store.clone(), Registry::settings())
        .handle(&remote(), EventKind::Update)
        .await
        .unwrap();

    let requests = store.requests();
    assert_eq!(requests.len(), 2);
    let central = SearchPredicate::ManagingOrganization(CENTRAL.to_string());
    for request in &requests {
        assert_eq!(request.limit, 1000);
        assert_eq!(request.predicates.first(), Some(&central));
    }
    assert_eq!(
        requests[0].predicates[1],
        SearchPredicate::LinkTarget("Patient/100".to_string())
    );
}

#[tokio::test]
async fn test_organization_predicate_omitted_when_unsupported() {
    let registry = Registry::new(ScriptedSimilarity::new(0.1)).await;
    let store = Arc::new(RecordingStore::new(registry.store.clone(), false));

    registry
        .orchestrator_over(store.clone(), Registry::settings())
        .handle(&remote(), EventKind::Update)
        .await
        .unwrap();

    assert!(store
        .requests()
        .iter()
        .flat_map(|r| r.predicates.iter())
        .all(|p| !matches!(p, SearchPredicate::ManagingOrganization(_))));
}
