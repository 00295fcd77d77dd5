//! Per-request values threaded through a page build.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::entities::{ContentObject, Page};

/// Free-form values supplied by the caller and exposed to templates and
/// the `@value` builtin.
pub type ExtraValues = Map<String, Value>;

/// An authenticated principal or one of its roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub uid: String,
    pub id: String,
    pub title: String,
    pub login: String,
    pub fields: BTreeMap<String, String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, login: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            login: login.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name.trim().to_ascii_lowercase().as_str() {
            "uid" => self.uid.as_str(),
            "id" => self.id.as_str(),
            "title" | "name" => self.title.as_str(),
            "login" => self.login.as_str(),
            _ => return self.fields.get(name.trim()).map(String::as_str),
        };
        Some(value)
    }
}

/// Read-only view of the incoming request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestContext {
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub user: Option<Identity>,
    pub profile: BTreeMap<String, String>,
    pub roles: Vec<Identity>,
    pub cookies: BTreeMap<String, String>,
    pub form: BTreeMap<String, String>,
}

impl RequestContext {
    /// Request for `path` and `query`; form values are decoded from the query.
    pub fn new(path: impl Into<String>, query: impl Into<String>) -> Self {
        let query = query.into();
        let query = query.strip_prefix('?').unwrap_or(&query).to_string();
        let form = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self {
            path: path.into(),
            query,
            form,
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: Identity) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_role(mut self, role: Identity) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_profile(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.profile.insert(name.into(), value.into());
        self
    }

    /// `path?query`, or just the path when there is no query.
    pub fn origin(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// Identity of the page being built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageContext {
    pub uid: String,
    pub id: String,
    pub title: String,
    pub domain: String,
}

impl PageContext {
    pub fn from_page(page: &Page, domain: impl Into<String>) -> Self {
        let object = page.object();
        Self {
            uid: object.uid.clone(),
            id: object.id.clone(),
            title: object.title.clone(),
            domain: domain.into(),
        }
    }
}

/// Content objects in scope of a formula: the object being configured plus
/// any list the projector builtins operate on.
#[derive(Debug, Clone, Default)]
pub struct DocumentContext {
    pub page: PageContext,
    pub current: Option<ContentObject>,
    pub objects: Vec<ContentObject>,
}

impl DocumentContext {
    pub fn new(page: PageContext) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    /// Scope for configuring `object`; it is both current and the projected list.
    pub fn for_object(page: PageContext, object: ContentObject) -> Self {
        Self {
            page,
            objects: vec![object.clone()],
            current: Some(object),
        }
    }
}
