//! # MPI Common Library
//!
//! Shared code for the master patient index services including:
//! - Patient and organization data model
//! - Resource identifier parsing and normalization
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod model;

pub use error::{Error, Result};
pub use model::{
    AdministrativeGender, HumanName, Identifier, LinkAnnotation, LinkType, NameUse, Organization,
    PatientRecord, Reference, ResourceId,
};
