//! Collaborator traits the build pipeline consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{entities::ContentObject, types::LinkDirection};

#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("content repository error: {0}")]
    Persistence(String),
    #[error("object `{id}` not found")]
    NotFound { id: String },
    #[error("unknown query `{name}`")]
    UnknownQuery { name: String },
    #[error("invalid query input: {message}")]
    InvalidInput { message: String },
    #[error("content repository timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Ordered set of objects returned by the content repository.
pub type ObjectSet = Vec<ContentObject>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryMetrics {
    pub result_size: u64,
    pub result_offset: u64,
    pub result_limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryResponse {
    pub data: ObjectSet,
    pub metrics: QueryMetrics,
}

impl QueryResponse {
    pub fn ids(&self) -> Vec<&str> {
        self.data.iter().map(ContentObject::key).collect()
    }
}

#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn get_object(&self, id: &str) -> Result<ObjectSet, RepoError>;

    async fn get_linked(
        &self,
        relation: &str,
        object_id: &str,
        direction: LinkDirection,
    ) -> Result<ObjectSet, RepoError>;

    async fn run_query(
        &self,
        name: &str,
        method: &str,
        body: Option<Value>,
    ) -> Result<QueryResponse, RepoError>;
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct MailError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Best-effort outbound mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ResizeError(pub String);

/// Produces a URL for a resized variant of an image.
#[async_trait]
pub trait ImageResizer: Send + Sync {
    async fn resize(
        &self,
        source: &str,
        width: u32,
        height: Option<u32>,
    ) -> Result<String, ResizeError>;
}
