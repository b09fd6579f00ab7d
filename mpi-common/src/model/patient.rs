//! Patient demographic records

use super::{Reference, ResourceId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Purpose tag of a human name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameUse {
    Usual,
    Official,
    Temp,
    Nickname,
    Anonymous,
    Old,
    Maiden,
}

/// One name entry of a patient
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanName {
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub name_use: Option<NameUse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
}

impl HumanName {
    pub fn new(name_use: Option<NameUse>, given: &[&str], family: &str) -> Self {
        Self {
            name_use,
            family: Some(family.to_string()),
            given: given.iter().map(|g| g.to_string()).collect(),
        }
    }

    /// Given names joined by single spaces
    pub fn given_as_single_string(&self) -> String {
        self.given.join(" ")
    }

    pub fn family_or_empty(&self) -> &str {
        self.family.as_deref().unwrap_or("")
    }

    /// Given tokens followed by the family name, empties dropped
    pub fn search_tokens(&self) -> Vec<String> {
        self.given
            .iter()
            .map(|g| g.trim())
            .chain(self.family.as_deref().map(str::trim))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Administrative gender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdministrativeGender {
    Male,
    Female,
    Other,
    Unknown,
}

impl AdministrativeGender {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

/// Business identifier assigned by a source system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub value: String,
}

/// Link semantics. The linker only ever writes `SeeAlso`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkType {
    #[serde(rename = "seealso")]
    SeeAlso,
    #[serde(rename = "replaced-by")]
    ReplacedBy,
    #[serde(rename = "replaces")]
    Replaces,
    #[serde(rename = "refer")]
    Refer,
}

/// Directional "same person" assertion carried by a central record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAnnotation {
    pub other: Reference,
    #[serde(rename = "type")]
    pub link_type: LinkType,
}

impl LinkAnnotation {
    pub fn see_also(target: &ResourceId) -> Self {
        Self {
            other: Reference::to(&target.unqualified_versionless()),
            link_type: LinkType::SeeAlso,
        }
    }

    pub fn refers_to(&self, target: &ResourceId) -> bool {
        self.other.points_to(target)
    }
}

/// Store-managed metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// Patient demographic record
///
/// `id` is `None` for a record that has not been persisted yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(rename = "identifier", default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<Identifier>,
    #[serde(rename = "name", default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<HumanName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<AdministrativeGender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managing_organization: Option<Reference>,
    #[serde(rename = "link", default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkAnnotation>,
}

impl PatientRecord {
    /// Main name used for searching and comparison
    ///
    /// **Selection:**
    /// 1. A name tagged `usual`
    /// 2. Otherwise the first name tagged `official` or carrying no tag
    /// 3. Otherwise none
    pub fn primary_name(&self) -> Option<&HumanName> {
        self.names
            .iter()
            .find(|n| n.name_use == Some(NameUse::Usual))
            .or_else(|| {
                self.names
                    .iter()
                    .find(|n| matches!(n.name_use, None | Some(NameUse::Official)))
            })
    }

    /// Birth date at day precision; partial or malformed dates give `None`
    pub fn birth_date_day(&self) -> Option<NaiveDate> {
        let raw = self.birth_date.as_deref()?.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }

    pub fn version_id(&self) -> Option<&str> {
        self.meta.as_ref()?.version_id.as_deref()
    }

    pub fn is_linked_to(&self, target: &ResourceId) -> bool {
        self.links.iter().any(|l| l.refers_to(target))
    }

    /// Remove every annotation pointing at `target`, returning how many went
    pub fn remove_links_to(&mut self, target: &ResourceId) -> usize {
        let before = self.links.len();
        self.links.retain(|l| !l.refers_to(target));
        before - self.links.len()
    }

    /// Human-readable `Family, Given (Patient/1)` label for logs and errors
    pub fn name_id_str(&self) -> String {
        let name = match self.primary_name() {
            Some(n) => format!("{}, {}", n.family_or_empty(), n.given_as_single_string()),
            None => "<no name>".to_string(),
        };
        match &self.id {
            Some(id) => format!("{} ({})", name, id.qualified()),
            None => format!("{} (new)", name),
        }
    }
}
