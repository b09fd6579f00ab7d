//! Organization resolution
//!
//! Decides which organization is the central authority. The linker only asks
//! yes/no questions and for a reference to stamp onto new master records.

use crate::store::{RecordStore, StoreError};
use async_trait::async_trait;
use mpi_common::model::ORGANIZATION_KIND;
use mpi_common::{Organization, Reference, ResourceId};
use std::sync::Arc;

/// Central-organization collaborator
#[async_trait]
pub trait OrganizationResolver: Send + Sync {
    /// Resolve a managing-organization reference; `None` when absent or dangling
    async fn load_from_reference(&self, reference: &Reference) -> Result<Option<Organization>, StoreError>;

    fn is_central(&self, organization: &Organization) -> bool;

    fn is_central_reference(&self, reference: &Reference) -> bool;

    fn create_reference(&self, organization: &Organization) -> Reference;

    fn central_organization(&self) -> Organization;
}

/// Resolver backed by the record store, with the central id taken from config
pub struct StoreOrganizationResolver {
    store: Arc<dyn RecordStore>,
    central: Organization,
}

impl StoreOrganizationResolver {
    /// Load the central organization from the store
    ///
    /// Falls back to a bare organization carrying only the configured id when
    /// the store has no such resource.
    pub async fn load(store: Arc<dyn RecordStore>, central_id: &str) -> mpi_common::Result<Self> {
        let id = ResourceId::parse_with_kind(central_id, ORGANIZATION_KIND)?;
        let central = match store.read_organization(&id).await {
            Ok(Some(org)) => org,
            Ok(None) => {
                tracing::warn!(organization = %id, "Central organization not in store, using bare reference");
                Organization::new(id, None)
            }
            Err(e) => {
                return Err(mpi_common::Error::Config(format!(
                    "Could not load central organization {}: {}",
                    id, e
                )))
            }
        };
        tracing::info!(organization = %central.id, "Central organization resolved");
        Ok(Self { store, central })
    }

    pub fn new(store: Arc<dyn RecordStore>, central: Organization) -> Self {
        Self { store, central }
    }
}

#[async_trait]
impl OrganizationResolver for StoreOrganizationResolver {
    async fn load_from_reference(&self, reference: &Reference) -> Result<Option<Organization>, StoreError> {
        let Some(id) = reference.target_id() else {
            return Ok(None);
        };
        if id.same_resource(&self.central.id) {
            return Ok(Some(self.central.clone()));
        }
        self.store.read_organization(&id).await
    }

    fn is_central(&self, organization: &Organization) -> bool {
        organization.id.same_resource(&self.central.id)
    }

    fn is_central_reference(&self, reference: &Reference) -> bool {
        reference.points_to(&self.central.id)
    }

    fn create_reference(&self, organization: &Organization) -> Reference {
        Reference {
            reference: Some(organization.id.qualified()),
            display: organization.name.clone(),
        }
    }

    fn central_organization(&self) -> Organization {
        self.central.clone()
    }
}
