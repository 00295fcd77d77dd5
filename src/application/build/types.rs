use std::{collections::BTreeMap, time::Duration};

use serde::{Serialize, Serializer};
use thiserror::Error;
use time::OffsetDateTime;

use crate::{
    application::{render::TemplateError, repos::RepoError},
    domain::{error::DomainError, types::BuildStrategy},
};

pub const DEFAULT_DEADLINE_MS: u64 = 10_000;
pub const DEFAULT_BLOCK_RELATION: &str = "block";
pub const DEFAULT_DOMAIN: &str = "localhost";

/// Page build parameters.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub deadline: Duration,
    pub strategy: BuildStrategy,
    /// Link relation connecting a page to its blocks.
    pub block_relation: String,
    pub domain: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(DEFAULT_DEADLINE_MS),
            strategy: BuildStrategy::default(),
            block_relation: DEFAULT_BLOCK_RELATION.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }
}

impl From<&crate::config::BuildSettings> for BuildConfig {
    fn from(settings: &crate::config::BuildSettings) -> Self {
        Self {
            deadline: settings.deadline,
            strategy: settings.strategy,
            block_relation: settings.block_relation.clone(),
            domain: settings.domain.clone(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("block `{block}` declares no template")]
    MissingTemplate { block: String },
    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Caching not enabled for this block.
    Bypass,
    Miss,
    Hit,
    /// Expired value served while a refresh runs.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Rendered,
    Cached,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockStats {
    pub block_id: String,
    pub block_uid: String,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(serialize_with = "millis")]
    pub elapsed: Duration,
    pub cache: CacheOutcome,
    pub status: BuildStatus,
    pub error: Option<String>,
}

/// Outcome of building one block.
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub block_id: String,
    pub html: String,
    pub stats: BlockStats,
    #[serde(skip)]
    pub error: Option<BuildError>,
}

impl BuildResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn from_cache(&self) -> bool {
        self.stats.status == BuildStatus::Cached
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageStats {
    pub strategy: BuildStrategy,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(serialize_with = "millis")]
    pub elapsed: Duration,
    /// Blocks present in the scheme and handed to the builder.
    pub dispatched: usize,
    pub completed: usize,
    pub errors: usize,
    pub cache_hits: usize,
    pub timed_out: bool,
    /// Per-block stats in document order.
    pub blocks: Vec<BlockStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageBuild {
    /// Keyed by block id.
    pub results: BTreeMap<String, BuildResult>,
    pub stats: PageStats,
    pub timed_out: bool,
}

fn millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Inline markup rendered in place of a failed block.
pub fn error_html(block_id: &str, error: &BuildError) -> String {
    format!(
        "<div class=\"tessera-block-error\" data-block=\"{}\">{}</div>",
        escape_html(block_id),
        escape_html(&error.to_string())
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
