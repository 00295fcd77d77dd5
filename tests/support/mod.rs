#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use tessera::{
    application::{
        build::{BlockBuilder, BuildConfig, BuildOrchestrator},
        formula::{Evaluator, FormulaConfig, FormulaServices},
        page::PageService,
        render::{TemplateEngine, TemplateError},
    },
    cache::{CacheConfig, CacheManager, ManualClock, MemoryDocumentStore},
    domain::entities::{ContentObject, TemplateRef},
    infra::{InMemoryContentRepository, LogMailer, MiniJinjaEngine, PassthroughResizer},
};
use time::macros::datetime;

pub const PAGE_UID: &str = "p-home";
pub const PAGE_ID: &str = "home";

/// Template engine that counts block renders and can hold a block back.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    inner: MiniJinjaEngine,
    delays: Mutex<HashMap<String, Duration>>,
    renders: Mutex<HashMap<String, usize>>,
}

impl ScriptedEngine {
    pub fn delay(&self, block_id: &str, by: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(block_id.to_string(), by);
    }

    pub fn renders(&self, block_id: &str) -> usize {
        self.renders
            .lock()
            .unwrap()
            .get(block_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl TemplateEngine for ScriptedEngine {
    async fn render(&self, template: &TemplateRef, context: &Value) -> Result<String, TemplateError> {
        if let Some(block_id) = context.pointer("/block/id").and_then(Value::as_str) {
            *self
                .renders
                .lock()
                .unwrap()
                .entry(block_id.to_string())
                .or_default() += 1;
            let delay = self.delays.lock().unwrap().get(block_id).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
        self.inner.render(template, context).await
    }
}

/// Fully wired page pipeline over in-memory content.
pub struct Harness {
    pub content: Arc<InMemoryContentRepository>,
    pub engine: Arc<ScriptedEngine>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryDocumentStore>,
    pub mailer: Arc<LogMailer>,
    pub evaluator: Arc<Evaluator>,
    pub builder: BlockBuilder,
    pub pages: PageService,
}

impl Harness {
    pub fn new(config: BuildConfig) -> Self {
        let content = Arc::new(InMemoryContentRepository::new());
        let engine = Arc::new(ScriptedEngine::default());
        let clock = Arc::new(ManualClock::new(datetime!(2024-01-31 12:00 UTC)));
        let store = Arc::new(MemoryDocumentStore::new());
        let mailer = Arc::new(LogMailer::new());

        let mut formula = FormulaConfig::default();
        formula
            .values
            .insert("site_name".into(), Value::String("Tessera".into()));
        let evaluator = Arc::new(Evaluator::new(
            formula,
            FormulaServices {
                content: content.clone(),
                mailer: mailer.clone(),
                resizer: Arc::new(PassthroughResizer::new("/media")),
                clock: clock.clone(),
            },
        ));

        let cache = CacheManager::new(CacheConfig::default(), store.clone(), clock.clone());
        let builder = BlockBuilder::new(cache, evaluator.clone(), content.clone(), engine.clone());
        let pages = PageService::new(
            content.clone(),
            engine.clone(),
            BuildOrchestrator::new(builder.clone()),
            config,
        );

        content.insert_object(
            ContentObject::new("l-main", "main-layout", "Main")
                .with_value("template", "{{ slots.main | join(\"|\") }}"),
        );

        Self {
            content,
            engine,
            clock,
            store,
            mailer,
            evaluator,
            builder,
            pages,
        }
    }

    /// Register the page with `scheme` as its slot document.
    pub fn page(&self, scheme: &str) {
        self.content.insert_object(
            ContentObject::new(PAGE_UID, PAGE_ID, "Home")
                .with_value("layout", "main-layout")
                .with_value("scheme", scheme),
        );
    }

    /// Register a block and link it to the page.
    pub fn block(&self, block: ContentObject) {
        self.content.insert_link("block", PAGE_UID, block.uid.clone());
        self.content.insert_object(block);
    }
}

pub fn block(id: &str, template: &str) -> ContentObject {
    ContentObject::new(format!("b-{id}"), id, id.to_uppercase()).with_value("template", template)
}

pub fn articles() -> Vec<ContentObject> {
    vec![
        ContentObject::new("a-1", "rust-2024", "Rust 2024"),
        ContentObject::new("a-2", "tokio", "Tokio 1.40"),
        ContentObject::new("a-3", "survey", "Rust survey"),
    ]
}

pub fn config_with(deadline: Duration) -> BuildConfig {
    BuildConfig {
        deadline,
        ..BuildConfig::default()
    }
}
