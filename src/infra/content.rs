//! In-memory content repository, optionally seeded from a JSON fixture.
//!
//! Fixture layout:
//!
//! ```json
//! {
//!   "objects": [{ "uid": "p-1", "id": "home", "title": "Home", "attributes": {} }],
//!   "links": [{ "relation": "block", "from": "p-1", "to": "b-1" }],
//!   "queries": { "latest": ["b-1"] }
//! }
//! ```
//!
//! Queries list object uids or ids. A request body may carry `offset`,
//! `limit` and a case-insensitive `filter` matched against id and title.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{
        RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    application::repos::{ContentRepository, ObjectSet, QueryMetrics, QueryResponse, RepoError},
    cache::lock::{rw_read, rw_write},
    domain::{entities::ContentObject, types::LinkDirection},
};

use super::error::InfraError;

const SOURCE: &str = "infra::content";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Link {
    pub relation: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    objects: Vec<ContentObject>,
    links: Vec<Link>,
    queries: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
struct ContentState {
    /// Keyed by uid.
    objects: BTreeMap<String, ContentObject>,
    links: Vec<Link>,
    queries: BTreeMap<String, Vec<String>>,
}

impl ContentState {
    fn resolve(&self, id: &str) -> Option<&ContentObject> {
        self.objects
            .get(id)
            .or_else(|| self.objects.values().find(|object| object.id == id))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryContentRepository {
    state: RwLock<ContentState>,
    queries_run: AtomicUsize,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture_str(raw: &str, origin: &Path) -> Result<Self, InfraError> {
        let fixture: Fixture =
            serde_json::from_str(raw).map_err(|err| InfraError::fixture(origin, err.to_string()))?;

        let repository = Self::new();
        for object in fixture.objects {
            if object.uid.is_empty() {
                return Err(InfraError::fixture(origin, "object without uid"));
            }
            repository.insert_object(object);
        }
        for link in fixture.links {
            repository.insert_link(link.relation, link.from, link.to);
        }
        for (name, ids) in fixture.queries {
            rw_write(&repository.state, SOURCE, "load_query")
                .queries
                .insert(name, ids);
        }
        Ok(repository)
    }

    pub async fn from_fixture_path(path: &Path) -> Result<Self, InfraError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_fixture_str(&raw, path)
    }

    pub fn insert_object(&self, object: ContentObject) {
        rw_write(&self.state, SOURCE, "insert_object")
            .objects
            .insert(object.uid.clone(), object);
    }

    pub fn insert_link(
        &self,
        relation: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) {
        rw_write(&self.state, SOURCE, "insert_link").links.push(Link {
            relation: relation.into(),
            from: from.into(),
            to: to.into(),
        });
    }

    /// Register a canned query whose results are `objects`, in order.
    pub fn insert_query(&self, name: impl Into<String>, objects: Vec<ContentObject>) {
        let mut state = rw_write(&self.state, SOURCE, "insert_query");
        let ids = objects.iter().map(|object| object.uid.clone()).collect();
        for object in objects {
            state.objects.entry(object.uid.clone()).or_insert(object);
        }
        state.queries.insert(name.into(), ids);
    }

    pub fn queries_run(&self) -> usize {
        self.queries_run.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn get_object(&self, id: &str) -> Result<ObjectSet, RepoError> {
        let state = rw_read(&self.state, SOURCE, "get_object");
        Ok(state.resolve(id).cloned().into_iter().collect())
    }

    async fn get_linked(
        &self,
        relation: &str,
        object_id: &str,
        direction: LinkDirection,
    ) -> Result<ObjectSet, RepoError> {
        let state = rw_read(&self.state, SOURCE, "get_linked");
        let Some(origin) = state.resolve(object_id) else {
            return Ok(Vec::new());
        };

        let linked = state
            .links
            .iter()
            .filter(|link| link.relation == relation)
            .filter_map(|link| match direction {
                LinkDirection::Outgoing if link.from == origin.uid => Some(link.to.as_str()),
                LinkDirection::Incoming if link.to == origin.uid => Some(link.from.as_str()),
                _ => None,
            })
            .filter_map(|uid| state.resolve(uid).cloned())
            .collect();
        Ok(linked)
    }

    async fn run_query(
        &self,
        name: &str,
        method: &str,
        body: Option<Value>,
    ) -> Result<QueryResponse, RepoError> {
        self.queries_run.fetch_add(1, Ordering::SeqCst);
        let state = rw_read(&self.state, SOURCE, "run_query");
        let ids = state.queries.get(name).ok_or_else(|| RepoError::UnknownQuery {
            name: name.to_string(),
        })?;

        let body = body.unwrap_or(Value::Null);
        let offset = number_field(&body, "offset")?.unwrap_or(0);
        let limit = number_field(&body, "limit")?;
        let filter = body
            .get("filter")
            .and_then(Value::as_str)
            .map(|filter| filter.trim().to_lowercase())
            .filter(|filter| !filter.is_empty());

        let matched: Vec<&ContentObject> = ids
            .iter()
            .filter_map(|id| state.resolve(id))
            .filter(|object| {
                filter.as_deref().is_none_or(|needle| {
                    object.id.to_lowercase().contains(needle)
                        || object.title.to_lowercase().contains(needle)
                })
            })
            .collect();

        let size = matched.len() as u64;
        let data: ObjectSet = matched
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit.map_or(usize::MAX, |limit| {
                usize::try_from(limit).unwrap_or(usize::MAX)
            }))
            .cloned()
            .collect();
        debug!(query = name, method, size, returned = data.len(), "query executed");

        Ok(QueryResponse {
            data,
            metrics: QueryMetrics {
                result_size: size,
                result_offset: offset,
                result_limit: limit.unwrap_or(0),
            },
        })
    }
}

/// Non-negative integer body field, given as a number or numeric string.
fn number_field(body: &Value, name: &str) -> Result<Option<u64>, RepoError> {
    match body.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .map(Some)
            .ok_or_else(|| RepoError::invalid_input(format!("`{name}` must be non-negative"))),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RepoError::invalid_input(format!("`{name}` is not a number: {raw}"))),
        Some(other) => Err(RepoError::invalid_input(format!(
            "`{name}` has unsupported value {other}"
        ))),
    }
}
