use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::application::{
    build::{BuildConfig, BuildOrchestrator, BuildResult, BuildScope, PageStats},
    context::{ExtraValues, PageContext, RequestContext},
    render::{TemplateEngine, TemplateError},
    repos::{ContentRepository, RepoError},
};
use crate::domain::{
    entities::{Block, Page},
    error::DomainError,
    types::LinkDirection,
};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("page `{id}` not found")]
    MissingPage { id: String },
    #[error("page `{page}` has no usable layout `{layout}`")]
    MissingLayout { page: String, layout: String },
    #[error("layout `{layout}` declares no template")]
    LayoutWithoutTemplate { layout: String },
    #[error("page `{page}` has no blocks")]
    EmptyBlockSet { page: String },
    #[error("invalid page scheme: {0}")]
    Scheme(#[source] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedPage {
    pub html: String,
    pub results: BTreeMap<String, BuildResult>,
    pub stats: PageStats,
    pub timed_out: bool,
}

#[derive(Clone)]
pub struct PageService {
    content: Arc<dyn ContentRepository>,
    templates: Arc<dyn TemplateEngine>,
    orchestrator: BuildOrchestrator,
    config: BuildConfig,
}

impl PageService {
    pub fn new(
        content: Arc<dyn ContentRepository>,
        templates: Arc<dyn TemplateEngine>,
        orchestrator: BuildOrchestrator,
        config: BuildConfig,
    ) -> Self {
        Self {
            content,
            templates,
            orchestrator,
            config,
        }
    }

    /// Fetch a page, build its blocks and render them into the page layout.
    ///
    /// With `cache_enabled` off every block is rendered and nothing is stored.
    #[instrument(skip(self, request, extra), fields(path = %request.path))]
    pub async fn render_page(
        &self,
        page_id: &str,
        request: RequestContext,
        extra: ExtraValues,
        cache_enabled: bool,
    ) -> Result<RenderedPage, PageError> {
        let page = self
            .content
            .get_object(page_id)
            .await?
            .into_iter()
            .next()
            .map(Page::new)
            .ok_or_else(|| PageError::MissingPage {
                id: page_id.to_string(),
            })?;

        let layout_id = page.layout_id().unwrap_or_default().to_string();
        let layout = match layout_id.as_str() {
            "" => None,
            id => self.content.get_object(id).await?.into_iter().next(),
        }
        .ok_or_else(|| PageError::MissingLayout {
            page: page_id.to_string(),
            layout: layout_id.clone(),
        })?;
        let layout_template = layout
            .template()
            .ok_or_else(|| PageError::LayoutWithoutTemplate {
                layout: layout_id.clone(),
            })?;

        let blocks: Vec<Block> = self
            .content
            .get_linked(&self.config.block_relation, page.uid(), LinkDirection::Outgoing)
            .await?
            .into_iter()
            .map(Block::new)
            .collect();
        if blocks.is_empty() {
            return Err(PageError::EmptyBlockSet {
                page: page_id.to_string(),
            });
        }

        let scheme = page.scheme().map_err(PageError::Scheme)?;
        debug!(blocks = blocks.len(), slots = scheme.slots().len(), "page loaded");

        let scope = BuildScope::new(
            request,
            PageContext::from_page(&page, self.config.domain.clone()),
            extra,
            cache_enabled,
        );
        let build = self
            .orchestrator
            .build_page(
                &blocks,
                &scheme,
                &scope,
                self.config.deadline,
                self.config.strategy,
            )
            .await;

        let rendered_blocks: BTreeMap<&str, &str> = build
            .results
            .iter()
            .map(|(id, result)| (id.as_str(), result.html.as_str()))
            .collect();
        let slots: BTreeMap<&str, Vec<&str>> = scheme
            .slots()
            .iter()
            .map(|(slot, ids)| {
                let html = ids
                    .iter()
                    .filter_map(|id| rendered_blocks.get(id.as_str()).copied())
                    .collect();
                (slot.as_str(), html)
            })
            .collect();

        let context = json!({
            "page": page,
            "layout": layout,
            "blocks": rendered_blocks,
            "slots": slots,
            "stats": build.stats,
            "request": &*scope.request,
            "values": &*scope.extra,
        });
        let html = self.templates.render(&layout_template, &context).await?;

        Ok(RenderedPage {
            html,
            results: build.results,
            stats: build.stats,
            timed_out: build.timed_out,
        })
    }
}
