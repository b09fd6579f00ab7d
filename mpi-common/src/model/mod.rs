//! Patient demographic data model
//!
//! A FHIR-flavoured subset: only the demographic fields the linker compares
//! plus the link annotations it maintains.

mod organization;
mod patient;
mod resource_id;

pub use organization::{Organization, Reference};
pub use patient::{
    AdministrativeGender, HumanName, Identifier, LinkAnnotation, LinkType, Meta, NameUse,
    PatientRecord,
};
pub use resource_id::ResourceId;

/// Resource type of patient records
pub const PATIENT_KIND: &str = "Patient";

/// Resource type of organizations
pub const ORGANIZATION_KIND: &str = "Organization";
