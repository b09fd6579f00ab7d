//! Resource identifiers
//!
//! Identifiers arrive in several shapes depending on where they were read from:
//!
//! ```text
//! Patient/123
//! Patient/123/_history/4
//! https://registry.example.org/fhir/Patient/123/_history/4
//! ```
//!
//! Every cross-record comparison goes through [`ResourceId::unqualified_versionless`]
//! so that base URLs and version suffixes never cause a missed match.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const HISTORY_SEGMENT: &str = "_history";

/// Parsed resource identifier (`[base/]Kind/id[/_history/version]`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    base: Option<String>,
    kind: String,
    id: String,
    version: Option<String>,
}

impl ResourceId {
    /// Build an unqualified, versionless identifier
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let kind = kind.into();
        let id = id.into();
        validate_kind(&kind)?;
        validate_id(&id)?;
        Ok(Self {
            base: None,
            kind,
            id,
            version: None,
        })
    }

    /// Parse a reference string, accepting a bare id when `default_kind` is given
    pub fn parse_with_kind(value: &str, default_kind: &str) -> Result<Self> {
        let trimmed = value.trim();
        if !trimmed.is_empty() && !trimmed.contains('/') {
            return Self::new(default_kind, trimmed);
        }
        trimmed.parse()
    }

    /// Resource type, e.g. `Patient`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Logical id part, e.g. `123`
    pub fn id_part(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// `Kind/id` form used for link annotations and identity keys
    pub fn qualified(&self) -> String {
        format!("{}/{}", self.kind, self.id)
    }

    /// Copy without base URL and version suffix
    pub fn unqualified_versionless(&self) -> ResourceId {
        ResourceId {
            base: None,
            kind: self.kind.clone(),
            id: self.id.clone(),
            version: None,
        }
    }

    /// Copy carrying the given version
    pub fn with_version(&self, version: impl Into<String>) -> ResourceId {
        ResourceId {
            version: Some(version.into()),
            ..self.clone()
        }
    }

    /// True when both identifiers name the same logical resource
    pub fn same_resource(&self, other: &ResourceId) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(base) = &self.base {
            write!(f, "{}/", base)?;
        }
        write!(f, "{}/{}", self.kind, self.id)?;
        if let Some(version) = &self.version {
            write!(f, "/{}/{}", HISTORY_SEGMENT, version)?;
        }
        Ok(())
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim().trim_end_matches('/');
        let mut segments: Vec<&str> = trimmed.split('/').collect();

        let version = if segments.len() >= 4 && segments[segments.len() - 2] == HISTORY_SEGMENT {
            let v = segments.pop().map(str::to_string);
            segments.pop();
            v
        } else {
            None
        };

        if segments.len() < 2 {
            return Err(Error::InvalidId(format!(
                "expected Kind/id, got '{}'",
                value
            )));
        }

        let id = segments[segments.len() - 1].to_string();
        let kind = segments[segments.len() - 2].to_string();
        validate_kind(&kind).map_err(|_| Error::InvalidId(format!("bad resource type in '{}'", value)))?;
        validate_id(&id).map_err(|_| Error::InvalidId(format!("bad id part in '{}'", value)))?;
        if let Some(v) = &version {
            if v.is_empty() {
                return Err(Error::InvalidId(format!("empty version in '{}'", value)));
            }
        }

        let base = if segments.len() > 2 {
            Some(segments[..segments.len() - 2].join("/"))
        } else {
            None
        };

        Ok(Self {
            base,
            kind,
            id,
            version,
        })
    }
}

impl TryFrom<String> for ResourceId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ResourceId> for String {
    fn from(value: ResourceId) -> Self {
        value.to_string()
    }
}

fn validate_kind(kind: &str) -> Result<()> {
    let mut chars = kind.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() && chars.all(|c| c.is_ascii_alphanumeric()) => Ok(()),
        _ => Err(Error::InvalidId(format!("invalid resource type '{}'", kind))),
    }
}

fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidId(format!("invalid id part '{}'", id)))
    }
}
