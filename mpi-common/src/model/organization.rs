//! Organizations and resource references

use super::{ResourceId, ORGANIZATION_KIND};
use serde::{Deserialize, Serialize};

/// Literal reference to another resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    pub fn to(id: &ResourceId) -> Self {
        Self {
            reference: Some(id.qualified()),
            display: None,
        }
    }

    /// Parsed target, `None` for absent or unparseable references
    pub fn target_id(&self) -> Option<ResourceId> {
        self.reference.as_deref()?.parse().ok()
    }

    /// True when the reference resolves to `id` (base and version ignored)
    pub fn points_to(&self, id: &ResourceId) -> bool {
        match self.target_id() {
            Some(target) => target.same_resource(id),
            None => self
                .reference
                .as_deref()
                .map(|r| !r.is_empty() && r.trim_end_matches('/').ends_with(&id.qualified()))
                .unwrap_or(false),
        }
    }
}

/// Owning organization of a patient record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Organization {
    pub fn new(id: ResourceId, name: Option<String>) -> Self {
        Self { id, name }
    }

    /// Organization identified only by its id, for when no stored resource exists
    pub fn bare(id: &str) -> crate::Result<Self> {
        Ok(Self {
            id: ResourceId::parse_with_kind(id, ORGANIZATION_KIND)?,
            name: None,
        })
    }
}
