//! Single-block build pipeline.
//!
//! cache lookup → formula resolution → sub-queries → template render →
//! cache write.

use std::{sync::Arc, time::Instant};

use futures::future::join_all;
use metrics::histogram;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use super::types::{
    BlockStats, BuildError, BuildResult, BuildStatus, CacheOutcome, error_html,
};
use crate::{
    application::{
        context::{DocumentContext, ExtraValues, PageContext, RequestContext},
        formula::{Evaluator, FormulaScope},
        pagination::Pagination,
        render::{TemplateEngine, strip_blank_lines},
        repos::ContentRepository,
    },
    cache::{BlockCacheKey, CacheLink, CacheLookup, CacheManager, CacheSetError},
    domain::entities::Block,
};

const METRIC_BLOCK_RENDER_MS: &str = "tessera_block_render_ms";

/// Per-build values shared by every block of a page.
#[derive(Debug, Clone)]
pub struct BuildScope {
    pub request: Arc<RequestContext>,
    pub page: Arc<PageContext>,
    pub extra: Arc<ExtraValues>,
    /// Off for builds that must skip the block cache in both directions.
    pub cache_enabled: bool,
}

impl BuildScope {
    pub fn new(
        request: RequestContext,
        page: PageContext,
        extra: ExtraValues,
        cache_enabled: bool,
    ) -> Self {
        Self {
            request: Arc::new(request),
            page: Arc::new(page),
            extra: Arc::new(extra),
            cache_enabled,
        }
    }
}

/// A sub-query declared in block configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeclaredQuery {
    pub name: String,
    /// Key under `datasets` in the template context; defaults to `name`.
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub body: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl DeclaredQuery {
    pub fn dataset(&self) -> &str {
        self.dataset
            .as_deref()
            .filter(|dataset| !dataset.is_empty())
            .unwrap_or(&self.name)
    }

    /// Body sent to the repository. Without an explicit body, a non-empty
    /// filter is sent as `{"filter": ...}`.
    pub fn effective_body(&self, filter: &str) -> Option<Value> {
        match &self.body {
            Some(body) => Some(body.clone()),
            None if !filter.trim().is_empty() => Some(json!({ "filter": filter })),
            None => None,
        }
    }
}

/// Resolved block configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockConfiguration {
    pub queries: Vec<DeclaredQuery>,
    /// The full resolved document, exposed to templates.
    pub raw: Value,
}

impl BlockConfiguration {
    pub fn parse(resolved: &str) -> Result<Self, BuildError> {
        if resolved.trim().is_empty() {
            return Ok(Self {
                queries: Vec::new(),
                raw: Value::Object(Map::new()),
            });
        }

        let raw: Value = serde_json::from_str(resolved)
            .map_err(|err| BuildError::configuration(err.to_string()))?;
        let queries = match raw.get("queries") {
            None | Some(Value::Null) => Vec::new(),
            Some(queries) => Vec::<DeclaredQuery>::deserialize(queries)
                .map_err(|err| BuildError::configuration(format!("queries: {err}")))?,
        };
        Ok(Self { queries, raw })
    }
}

#[derive(Clone)]
pub struct BlockBuilder {
    cache: CacheManager,
    evaluator: Arc<Evaluator>,
    content: Arc<dyn ContentRepository>,
    templates: Arc<dyn TemplateEngine>,
}

impl BlockBuilder {
    pub fn new(
        cache: CacheManager,
        evaluator: Arc<Evaluator>,
        content: Arc<dyn ContentRepository>,
        templates: Arc<dyn TemplateEngine>,
    ) -> Self {
        Self {
            cache,
            evaluator,
            content,
            templates,
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Build one block. Never fails: errors are rendered inline and
    /// reported in the result.
    pub async fn build_block(
        &self,
        block: &Block,
        scope: &BuildScope,
        cancel: &CancellationToken,
    ) -> BuildResult {
        let started_at = self.cache.clock().now();
        let timer = Instant::now();

        let ttl = self.cache_minutes(block, scope.cache_enabled);
        let key = BlockCacheKey::for_block(block, &scope.request.path, &scope.request.query);

        let mut cache = CacheOutcome::Bypass;
        if ttl > 0 {
            let lookup = self
                .cache
                .get(&key, || {
                    let builder = self.clone();
                    let block = block.clone();
                    let scope = scope.clone();
                    let key = key.clone();
                    let span = info_span!("block_refresh", block_id = %block.key());
                    async move { builder.refresh(block, scope, key, ttl).await }.instrument(span)
                })
                .await;

            cache = match &lookup {
                CacheLookup::Miss => CacheOutcome::Miss,
                CacheLookup::Fresh(_) => CacheOutcome::Hit,
                CacheLookup::Stale { .. } => CacheOutcome::Stale,
            };
            if let Some(html) = lookup.into_value() {
                debug!(block_id = %block.key(), cache_key = %key, outcome = ?cache, "served from cache");
                return finish(block, started_at, timer, cache, Ok(html));
            }
        }

        let rendered = if cancel.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            self.render(block, scope, cancel).await
        };

        if let Ok(html) = &rendered
            && ttl > 0
        {
            self.store(&key, html, block, scope, ttl).await;
        }

        histogram!(METRIC_BLOCK_RENDER_MS).record(timer.elapsed().as_secs_f64() * 1000.0);
        finish(block, started_at, timer, cache, rendered)
    }

    fn cache_minutes(&self, block: &Block, cache_enabled: bool) -> u32 {
        if !cache_enabled || !self.cache.config().enabled {
            return 0;
        }
        match block.cache_minutes() {
            Ok(minutes) => minutes,
            Err(err) => {
                warn!(block_id = %block.key(), error = %err, "ignoring invalid cache interval");
                0
            }
        }
    }

    async fn refresh(&self, block: Block, scope: BuildScope, key: BlockCacheKey, ttl: u32) {
        match self.render(&block, &scope, &CancellationToken::new()).await {
            Ok(html) => {
                self.store(&key, &html, &block, &scope, ttl).await;
                debug!(cache_key = %key, "block refreshed");
            }
            Err(err) => {
                warn!(cache_key = %key, error = %err, "block refresh failed; stale value kept");
            }
        }
    }

    async fn store(&self, key: &BlockCacheKey, html: &str, block: &Block, scope: &BuildScope, ttl: u32) {
        let link = CacheLink::new(scope.page.uid.clone(), block.uid());
        match self
            .cache
            .set(key, html.to_string(), link, ttl, scope.request.origin())
            .await
        {
            Ok(()) | Err(CacheSetError::Disabled) => {}
            Err(CacheSetError::Store(err)) => {
                warn!(cache_key = %key, error = %err, "cache write failed");
            }
        }
    }

    async fn render(
        &self,
        block: &Block,
        scope: &BuildScope,
        cancel: &CancellationToken,
    ) -> Result<String, BuildError> {
        let document = DocumentContext::for_object((*scope.page).clone(), block.object().clone());
        let formula_scope = FormulaScope::new(&scope.request, &document, &scope.extra);

        let filter = self.evaluator.evaluate(block.filter(), &formula_scope).await;
        let resolved = self
            .evaluator
            .evaluate(block.configuration(), &formula_scope)
            .await;
        let configuration = BlockConfiguration::parse(&resolved)?;

        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let datasets = self.run_queries(&configuration.queries, &filter).await?;

        let template = block.template().ok_or_else(|| BuildError::MissingTemplate {
            block: block.key().to_string(),
        })?;
        let context = json!({
            "block": block,
            "page": &*scope.page,
            "request": {
                "path": scope.request.path,
                "query": scope.request.query,
                "form": scope.request.form,
                "user": scope.request.user,
            },
            "configuration": configuration.raw,
            "filter": filter,
            "datasets": datasets,
            "values": &*scope.extra,
        });

        let rendered = self.templates.render(&template, &context).await?;
        Ok(strip_blank_lines(&rendered))
    }

    async fn run_queries(
        &self,
        queries: &[DeclaredQuery],
        filter: &str,
    ) -> Result<Map<String, Value>, BuildError> {
        let responses = join_all(queries.iter().map(|query| {
            self.content
                .run_query(&query.name, &query.method, query.effective_body(filter))
        }))
        .await;

        let mut datasets = Map::new();
        for (query, response) in queries.iter().zip(responses) {
            let response = response?;
            datasets.insert(
                query.dataset().to_string(),
                json!({
                    "data": response.data,
                    "ids": response.ids(),
                    "metrics": response.metrics,
                    "pagination": Pagination::from_metrics(&response.metrics),
                }),
            );
        }
        Ok(datasets)
    }
}

fn finish(
    block: &Block,
    started_at: time::OffsetDateTime,
    timer: Instant,
    cache: CacheOutcome,
    rendered: Result<String, BuildError>,
) -> BuildResult {
    let (html, status, error) = match rendered {
        Ok(html) => {
            let status = match cache {
                CacheOutcome::Hit | CacheOutcome::Stale => BuildStatus::Cached,
                CacheOutcome::Bypass | CacheOutcome::Miss => BuildStatus::Rendered,
            };
            (html, status, None)
        }
        Err(err) => {
            debug!(block_id = %block.key(), error = %err, "block build failed");
            (error_html(block.key(), &err), BuildStatus::Error, Some(err))
        }
    };

    BuildResult {
        block_id: block.key().to_string(),
        html,
        stats: BlockStats {
            block_id: block.key().to_string(),
            block_uid: block.uid().to_string(),
            title: block.title().to_string(),
            started_at,
            elapsed: timer.elapsed(),
            cache,
            status,
            error: error.as_ref().map(ToString::to_string),
        },
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_extracts_queries() {
        let configuration = BlockConfiguration::parse(
            r#"{"title": "Latest", "queries": [
                {"name": "news", "dataset": "items", "body": {"limit": 5}},
                {"name": "tags"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(configuration.queries.len(), 2);
        assert_eq!(configuration.queries[0].dataset(), "items");
        assert_eq!(configuration.queries[1].dataset(), "tags");
        assert_eq!(configuration.queries[1].method, "GET");
        assert_eq!(configuration.raw["title"], "Latest");
    }

    #[test]
    fn blank_configuration_is_empty_object() {
        let configuration = BlockConfiguration::parse("  ").unwrap();
        assert!(configuration.queries.is_empty());
        assert_eq!(configuration.raw, json!({}));
    }

    #[test]
    fn malformed_configuration_is_an_error() {
        assert!(matches!(
            BlockConfiguration::parse("{\"queries\": "),
            Err(BuildError::Configuration { .. })
        ));
        assert!(matches!(
            BlockConfiguration::parse(r#"{"queries": [{"dataset": "x"}]}"#),
            Err(BuildError::Configuration { .. })
        ));
    }

    #[test]
    fn filter_becomes_default_body() {
        let query = DeclaredQuery {
            name: "news".into(),
            dataset: None,
            method: default_method(),
            body: None,
        };
        assert_eq!(query.effective_body("tag:rust"), Some(json!({"filter": "tag:rust"})));
        assert_eq!(query.effective_body(" "), None);

        let explicit = DeclaredQuery {
            body: Some(json!({"limit": 2})),
            ..query
        };
        assert_eq!(explicit.effective_body("tag:rust"), Some(json!({"limit": 2})));
    }
}
