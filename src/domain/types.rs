//! Shared domain enumerations.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Facet of an attribute that projectors may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeFacet {
    Value,
    Source,
    Template,
    Revision,
    Status,
}

impl AttributeFacet {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeFacet::Value => "value",
            AttributeFacet::Source => "src",
            AttributeFacet::Template => "tpls",
            AttributeFacet::Revision => "rev",
            AttributeFacet::Status => "status",
        }
    }
}

impl FromStr for AttributeFacet {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "value" => Ok(AttributeFacet::Value),
            "src" | "source" => Ok(AttributeFacet::Source),
            "tpls" | "template" => Ok(AttributeFacet::Template),
            "rev" | "revision" => Ok(AttributeFacet::Revision),
            "status" => Ok(AttributeFacet::Status),
            other => Err(DomainError::validation(format!(
                "unknown attribute facet `{other}`"
            ))),
        }
    }
}

/// Field of a content object selectable by the object projector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectField {
    Uid,
    Id,
    Source,
    Title,
    Kind,
}

impl FromStr for ObjectField {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uid" => Ok(ObjectField::Uid),
            "id" => Ok(ObjectField::Id),
            "source" | "src" => Ok(ObjectField::Source),
            "title" => Ok(ObjectField::Title),
            "type" | "kind" => Ok(ObjectField::Kind),
            other => Err(DomainError::validation(format!(
                "unknown object field `{other}`"
            ))),
        }
    }
}

/// Direction in which a link relation is followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDirection {
    /// From the given object to its children.
    Outgoing,
    /// From the given object to its parents.
    Incoming,
}

/// Fan-out strategy used to build the blocks of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStrategy {
    Sequential,
    #[default]
    Concurrent,
}

impl BuildStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStrategy::Sequential => "sequential",
            BuildStrategy::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStrategy {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(BuildStrategy::Sequential),
            "concurrent" | "parallel" => Ok(BuildStrategy::Concurrent),
            other => Err(DomainError::validation(format!(
                "unknown build strategy `{other}`"
            ))),
        }
    }
}
