//! Master record creation
//!
//! When no existing central record links to the remote record, a new master
//! is built from the remote record's demographics and queued for creation.

use super::change_batch::ChangeSet;
use crate::organization::OrganizationResolver;
use mpi_common::{LinkAnnotation, PatientRecord, ResourceId};
use std::sync::Arc;

/// Builds new central records
pub struct MasterCreator {
    organizations: Arc<dyn OrganizationResolver>,
}

impl MasterCreator {
    pub fn new(organizations: Arc<dyn OrganizationResolver>) -> Self {
        Self { organizations }
    }

    /// Copy the demographics of `remote` into a new, unidentified central record
    ///
    /// The copy has no id, no source identifiers, a single link to the remote
    /// record, and the central organization as managing organization. It is
    /// added to `changes` and also returned.
    pub fn create_central(
        &self,
        remote: &PatientRecord,
        remote_id: &ResourceId,
        changes: &mut ChangeSet,
    ) -> PatientRecord {
        let central_org = self.organizations.central_organization();

        let central = PatientRecord {
            id: None,
            meta: None,
            identifiers: Vec::new(),
            names: remote.names.clone(),
            gender: remote.gender,
            birth_date: remote.birth_date.clone(),
            managing_organization: Some(self.organizations.create_reference(&central_org)),
            links: vec![LinkAnnotation::see_also(remote_id)],
        };

        changes.mark_changed(central.clone());
        tracing::info!(
            central = %central.name_id_str(),
            remote = %remote.name_id_str(),
            organization = %central_org.id,
            "Added central master record"
        );
        central
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organization::StoreOrganizationResolver;
    use crate::store::InMemoryStore;
    use mpi_common::{AdministrativeGender, HumanName, Identifier, NameUse, Organization, Reference};

    #[test]
    fn test_master_copy_shape() {
        let organizations = StoreOrganizationResolver::new(
            Arc::new(InMemoryStore::new()),
            Organization::bare("central").unwrap(),
        );
        let creator = MasterCreator::new(Arc::new(organizations));

        let remote_id: ResourceId = "Patient/99".parse().unwrap();
        let remote = PatientRecord {
            id: Some(remote_id.clone()),
            identifiers: vec![Identifier {
                system: Some("urn:clinic-a:mrn".into()),
                value: "A-1001".into(),
            }],
            names: vec![HumanName::new(Some(NameUse::Official), &["Jane"], "Doe")],
            gender: Some(AdministrativeGender::Female),
            birth_date: Some("1980-01-01".into()),
            managing_organization: Some(Reference {
                reference: Some("Organization/clinic-a".into()),
                display: None,
            }),
            ..Default::default()
        };

        let mut changes = ChangeSet::new();
        let central = creator.create_central(&remote, &remote_id, &mut changes);

        assert!(central.id.is_none());
        assert!(central.identifiers.is_empty());
        assert_eq!(central.names, remote.names);
        assert_eq!(central.birth_date, remote.birth_date);
        assert_eq!(central.gender, remote.gender);
        assert_eq!(central.links, vec![LinkAnnotation::see_also(&remote_id)]);
        assert_eq!(
            central.managing_organization.unwrap().reference.as_deref(),
            Some("Organization/central")
        );
        assert_eq!(changes.new_records().count(), 1);
        assert!(changes.get(&remote_id).is_none());
    }
}
