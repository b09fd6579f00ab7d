//! Candidate discovery
//!
//! Two retrieval strategies against the record store:
//! - **Linked:** central records that already carry a link annotation to the
//!   remote record. Authoritative and cheap to confirm or retract.
//! - **Similar:** central records whose name tokens and exact birth date
//!   match the remote record's primary name. The fallback discovery path.
//!
//! Both strategies drop the remote record itself and anything not owned by
//! the central organization, so a namesake at another facility is never
//! reconciled (and never written).

use crate::organization::OrganizationResolver;
use crate::store::{PredicateKind, RecordStore, SearchPredicate, SearchRequest, StoreError};
use mpi_common::{Organization, PatientRecord, ResourceId};
use std::collections::HashSet;
use std::sync::Arc;

/// Record reached through a link annotation, with its owning organization
#[derive(Debug, Clone)]
pub struct LinkedRecord {
    pub record: PatientRecord,
    pub organization: Option<Organization>,
}

/// Candidate source over the record store
pub struct CandidateSource {
    store: Arc<dyn RecordStore>,
    organizations: Arc<dyn OrganizationResolver>,
    search_limit: usize,
}

impl CandidateSource {
    pub fn new(
        store: Arc<dyn RecordStore>,
        organizations: Arc<dyn OrganizationResolver>,
        search_limit: usize,
    ) -> Self {
        Self {
            store,
            organizations,
            search_limit,
        }
    }

    /// Central records whose link annotations reference `remote`
    ///
    /// Empty when `remote` has not been persisted yet.
    pub async fn find_linked_centrals(&self, remote: &PatientRecord) -> Result<Vec<PatientRecord>, StoreError> {
        let Some(remote_id) = remote.id.as_ref() else {
            return Ok(Vec::new());
        };

        let target = remote_id.unqualified_versionless().qualified();
        let request = self
            .base_request()
            .with(SearchPredicate::LinkTarget(target.clone()));

        let found = self.store.search_patients(&request).await?;
        let found_count = found.len();
        let candidates = self.restrict(found, Some(remote_id));

        tracing::debug!(
            remote = %target,
            found = found_count,
            kept = candidates.len(),
            "Linked central candidates"
        );
        Ok(candidates)
    }

    /// Central records demographically similar to `remote`
    ///
    /// **Search:**
    /// 1. Primary name of `remote` (none → empty result)
    /// 2. Given tokens plus family name, any of which may match
    /// 3. Exact birth date (missing or malformed → empty result)
    /// 4. Fresh results only, capped at the configured limit
    pub async fn find_similar_centrals(&self, remote: &PatientRecord) -> Result<Vec<PatientRecord>, StoreError> {
        let Some(name) = remote.primary_name() else {
            tracing::debug!(remote = %remote.name_id_str(), "No primary name, skipping similarity search");
            return Ok(Vec::new());
        };
        let Some(birth_date) = remote.birth_date_day() else {
            tracing::debug!(
                remote = %remote.name_id_str(),
                birth_date = ?remote.birth_date,
                "No usable birth date, skipping similarity search"
            );
            return Ok(Vec::new());
        };
        let tokens = name.search_tokens();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let request = self
            .base_request()
            .with(SearchPredicate::NameContains(tokens))
            .with(SearchPredicate::BirthDate(birth_date));

        let found = self.store.search_patients(&request).await?;
        let found_count = found.len();
        let candidates = self.restrict(found, remote.id.as_ref());

        tracing::info!(
            remote = %remote.name_id_str(),
            found = found_count,
            kept = candidates.len(),
            "Similar central candidates"
        );
        Ok(candidates)
    }

    /// Read every record `central` links to, with its managing organization
    ///
    /// Dangling links are skipped.
    pub async fn load_linked_records(&self, central: &PatientRecord) -> Result<Vec<LinkedRecord>, StoreError> {
        let mut linked = Vec::new();

        for link in &central.links {
            let Some(target) = link.other.target_id() else {
                continue;
            };
            let Some(record) = self.store.read_patient(&target).await? else {
                tracing::debug!(central = %central.name_id_str(), target = %target, "Dangling link");
                continue;
            };
            let organization = match &record.managing_organization {
                Some(reference) => self.organizations.load_from_reference(reference).await?,
                None => None,
            };
            linked.push(LinkedRecord { record, organization });
        }

        tracing::debug!(central = %central.name_id_str(), linked = linked.len(), "Linked records loaded");
        Ok(linked)
    }

    fn base_request(&self) -> SearchRequest {
        let mut request = SearchRequest::new(self.search_limit).no_cache();
        if self.store.supports_predicate(PredicateKind::ManagingOrganization) {
            let central = self.organizations.central_organization();
            request = request.with(SearchPredicate::ManagingOrganization(central.id.qualified()));
        }
        request
    }

    /// Drop the remote record itself, duplicates, and non-central records
    fn restrict(&self, found: Vec<PatientRecord>, remote_id: Option<&ResourceId>) -> Vec<PatientRecord> {
        let mut seen = HashSet::new();

        found
            .into_iter()
            .filter(|candidate| {
                let Some(id) = candidate.id.as_ref() else {
                    return false;
                };
                if remote_id.map(|r| r.same_resource(id)).unwrap_or(false) {
                    return false;
                }
                if !seen.insert(id.qualified()) {
                    return false;
                }
                let central = candidate
                    .managing_organization
                    .as_ref()
                    .map(|r| self.organizations.is_central_reference(r))
                    .unwrap_or(false);
                if !central {
                    tracing::warn!(
                        candidate = %candidate.name_id_str(),
                        organization = ?candidate.managing_organization.as_ref().and_then(|r| r.reference.as_deref()),
                        "Ignoring candidate not owned by the central organization"
                    );
                }
                central
            })
            .collect()
    }
}
