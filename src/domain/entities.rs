//! Content objects as delivered by the content repository, plus the typed
//! block and page views the build pipeline works with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{
    error::DomainError,
    scheme::Scheme,
    types::{AttributeFacet, ObjectField},
};

pub const ATTR_CACHE: &str = "cache";
pub const ATTR_CACHE_NOPATH: &str = "cache_nopath";
pub const ATTR_CACHE_NOQUERY: &str = "cache_noquery";
pub const ATTR_CONFIGURATION: &str = "configuration";
pub const ATTR_FILTER: &str = "filter";
pub const ATTR_TEMPLATE: &str = "template";
pub const ATTR_LAYOUT: &str = "layout";
pub const ATTR_SCHEME: &str = "scheme";

/// A single named attribute of a content object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Attribute {
    pub value: String,
    #[serde(rename = "src")]
    pub source_ref: String,
    #[serde(rename = "tpls")]
    pub template_ref: String,
    #[serde(rename = "rev")]
    pub revision: String,
    pub status: String,
}

impl Attribute {
    pub fn from_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn facet(&self, facet: AttributeFacet) -> &str {
        match facet {
            AttributeFacet::Value => &self.value,
            AttributeFacet::Source => &self.source_ref,
            AttributeFacet::Template => &self.template_ref,
            AttributeFacet::Revision => &self.revision,
            AttributeFacet::Status => &self.status,
        }
    }
}

/// Where a template comes from: a name resolved by the template engine, or
/// source text carried inline by the object itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateRef {
    Named(String),
    Inline(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentObject {
    pub uid: String,
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub attributes: BTreeMap<String, Attribute>,
}

impl ContentObject {
    pub fn new(uid: impl Into<String>, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn with_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_attribute(name, Attribute::from_value(value))
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Attribute value, treating blank values as absent.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .map(|attribute| attribute.value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    pub fn field(&self, field: ObjectField) -> &str {
        match field {
            ObjectField::Uid => &self.uid,
            ObjectField::Id => &self.id,
            ObjectField::Source => &self.source,
            ObjectField::Title => &self.title,
            ObjectField::Kind => &self.kind,
        }
    }

    /// Public identifier used by schemes and result maps; falls back to the
    /// uid for objects without a human-assigned id.
    pub fn key(&self) -> &str {
        if self.id.is_empty() {
            &self.uid
        } else {
            &self.id
        }
    }

    /// Template declared by the `template` attribute. A named reference wins
    /// over inline source.
    pub fn template(&self) -> Option<TemplateRef> {
        let attribute = self.attribute(ATTR_TEMPLATE)?;
        if !attribute.template_ref.trim().is_empty() {
            return Some(TemplateRef::Named(attribute.template_ref.trim().to_string()));
        }
        if !attribute.value.trim().is_empty() {
            return Some(TemplateRef::Inline(attribute.value.clone()));
        }
        None
    }

    fn flag(&self, name: &str) -> bool {
        self.value(name).is_some_and(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "checked"
            )
        })
    }
}

/// A page content unit with its own configuration and cache policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Block {
    object: ContentObject,
}

impl Block {
    pub fn new(object: ContentObject) -> Self {
        Self { object }
    }

    pub fn object(&self) -> &ContentObject {
        &self.object
    }

    pub fn uid(&self) -> &str {
        &self.object.uid
    }

    pub fn key(&self) -> &str {
        self.object.key()
    }

    pub fn title(&self) -> &str {
        &self.object.title
    }

    /// Cache interval in minutes; zero disables caching.
    pub fn cache_minutes(&self) -> Result<u32, DomainError> {
        match self.object.value(ATTR_CACHE) {
            None => Ok(0),
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|err| DomainError::attribute(ATTR_CACHE, err.to_string())),
        }
    }

    pub fn cache_omits_path(&self) -> bool {
        self.object.flag(ATTR_CACHE_NOPATH)
    }

    pub fn cache_omits_query(&self) -> bool {
        self.object.flag(ATTR_CACHE_NOQUERY)
    }

    pub fn configuration(&self) -> &str {
        self.object.value(ATTR_CONFIGURATION).unwrap_or_default()
    }

    pub fn filter(&self) -> &str {
        self.object.value(ATTR_FILTER).unwrap_or_default()
    }

    pub fn template(&self) -> Option<TemplateRef> {
        self.object.template()
    }
}

impl From<ContentObject> for Block {
    fn from(object: ContentObject) -> Self {
        Self::new(object)
    }
}

/// A composite document assembled from blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Page {
    object: ContentObject,
}

impl Page {
    pub fn new(object: ContentObject) -> Self {
        Self { object }
    }

    pub fn object(&self) -> &ContentObject {
        &self.object
    }

    pub fn uid(&self) -> &str {
        &self.object.uid
    }

    pub fn title(&self) -> &str {
        &self.object.title
    }

    pub fn layout_id(&self) -> Option<&str> {
        self.object.value(ATTR_LAYOUT).map(str::trim)
    }

    pub fn scheme(&self) -> Result<Scheme, DomainError> {
        Scheme::parse(self.object.value(ATTR_SCHEME).unwrap_or_default())
    }
}
