mod support;

use std::time::Duration;

use serde_json::Map;
use tessera::{
    application::{
        build::{BuildError, BuildStatus, CacheOutcome},
        context::RequestContext,
        page::PageError,
        repos::RepoError,
    },
    domain::{entities::ContentObject, types::BuildStrategy},
};

use support::{Harness, PAGE_ID, articles, block, config_with};

const SCHEME: &str = r#"{"main": ["alpha", "beta", "gamma"]}"#;

async fn render(harness: &Harness) -> tessera::application::page::RenderedPage {
    harness
        .pages
        .render_page(PAGE_ID, RequestContext::new("/", ""), Map::new(), true)
        .await
        .expect("page renders")
}

#[tokio::test]
async fn every_block_in_the_scheme_produces_a_result() {
    let harness = Harness::new(config_with(Duration::from_secs(5)));
    harness.page(SCHEME);
    for id in ["alpha", "beta", "gamma"] {
        harness.block(block(id, "<p>{{ block.title }}</p>"));
    }
    harness.block(block("orphan", "<p>never</p>"));

    let page = render(&harness).await;

    assert!(!page.timed_out);
    assert_eq!(page.results.len(), 3);
    assert_eq!(page.stats.dispatched, 3);
    assert_eq!(page.stats.completed, 3);
    assert_eq!(page.html, "<p>ALPHA</p>|<p>BETA</p>|<p>GAMMA</p>");
    assert_eq!(harness.engine.renders("orphan"), 0);

    let ids: Vec<&str> = page
        .stats
        .blocks
        .iter()
        .map(|stats| stats.block_id.as_str())
        .collect();
    assert_eq!(ids, vec!["alpha", "beta", "gamma"]);
}

#[tokio::test(start_paused = true)]
async fn slow_block_is_left_out_when_the_deadline_passes() {
    let harness = Harness::new(config_with(Duration::from_millis(100)));
    harness.page(r#"{"main": ["alpha", "beta"]}"#);
    harness.block(block("alpha", "<p>fast</p>"));
    harness.block(block("beta", "<p>slow</p>"));
    harness.engine.delay("beta", Duration::from_secs(5));

    let page = render(&harness).await;

    assert!(page.timed_out);
    assert!(page.stats.timed_out);
    assert!(page.results.contains_key("alpha"));
    assert!(!page.results.contains_key("beta"));
    assert_eq!(page.stats.dispatched, 2);
    assert_eq!(page.stats.completed, 1);
    assert_eq!(page.html, "<p>fast</p>");
}

#[tokio::test(start_paused = true)]
async fn sequential_builds_stop_at_the_deadline() {
    let mut config = config_with(Duration::from_millis(100));
    config.strategy = BuildStrategy::Sequential;
    let harness = Harness::new(config);
    harness.page(SCHEME);
    harness.block(block("alpha", "<p>a</p>"));
    harness.block(block("beta", "<p>b</p>"));
    harness.block(block("gamma", "<p>c</p>"));
    harness.engine.delay("beta", Duration::from_secs(5));

    let page = render(&harness).await;

    assert!(page.timed_out);
    assert_eq!(page.stats.strategy, BuildStrategy::Sequential);
    assert_eq!(page.results.keys().collect::<Vec<_>>(), vec!["alpha"]);
    assert_eq!(harness.engine.renders("gamma"), 0);
}

#[tokio::test]
async fn failing_block_renders_inline_error_without_failing_the_page() {
    let harness = Harness::new(config_with(Duration::from_secs(5)));
    harness.page(r#"{"main": ["alpha", "broken"]}"#);
    harness.block(block("alpha", "<p>ok</p>"));
    harness.block(block("broken", "<p>never</p>").with_value("configuration", "{\"queries\": "));

    let page = render(&harness).await;

    assert_eq!(page.stats.errors, 1);
    let broken = &page.results["broken"];
    assert!(broken.is_error());
    assert_eq!(broken.stats.status, BuildStatus::Error);
    assert!(broken.html.contains("tessera-block-error"));
    assert!(page.html.starts_with("<p>ok</p>|<div class=\"tessera-block-error\""));
}

#[tokio::test(start_paused = true)]
async fn cached_block_is_reused_then_refreshed_after_expiry() {
    let harness = Harness::new(config_with(Duration::from_secs(5)));
    harness.page(r#"{"main": ["alpha", "beta"]}"#);
    harness.block(
        block("alpha", "<a>{{ configuration.stamp }}</a>")
            .with_value("cache", "10")
            .with_value("configuration", r#"{"stamp": "@now()"}"#),
    );
    harness.block(
        block("beta", "<b>{{ configuration.stamp }}</b>")
            .with_value("cache", "0")
            .with_value("configuration", r#"{"stamp": "@now()"}"#),
    );

    let first = render(&harness).await;
    assert_eq!(first.results["alpha"].stats.cache, CacheOutcome::Miss);
    assert_eq!(first.results["beta"].stats.cache, CacheOutcome::Bypass);
    assert_eq!(first.results["alpha"].html, "<a>2024-01-31T12:00:00Z</a>");

    harness.clock.advance(Duration::from_secs(5 * 60));
    let second = render(&harness).await;
    assert_eq!(second.results["alpha"].stats.cache, CacheOutcome::Hit);
    assert!(second.results["alpha"].from_cache());
    assert_eq!(second.results["alpha"].html, "<a>2024-01-31T12:00:00Z</a>");
    assert_eq!(second.results["beta"].html, "<b>2024-01-31T12:05:00Z</b>");
    assert_eq!(second.stats.cache_hits, 1);
    assert_eq!(harness.engine.renders("alpha"), 1);
    assert_eq!(harness.engine.renders("beta"), 2);

    harness.clock.advance(Duration::from_secs(6 * 60));
    let third = render(&harness).await;
    assert_eq!(third.results["alpha"].stats.cache, CacheOutcome::Stale);
    assert_eq!(third.results["alpha"].html, "<a>2024-01-31T12:00:00Z</a>");

    for _ in 0..50 {
        if harness.engine.renders("alpha") == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(harness.engine.renders("alpha"), 2);

    let fourth = render(&harness).await;
    assert_eq!(fourth.results["alpha"].stats.cache, CacheOutcome::Hit);
    assert_eq!(fourth.results["alpha"].html, "<a>2024-01-31T12:11:00Z</a>");
    assert_eq!(harness.store.len(), 1);
}

#[tokio::test]
async fn cache_key_ignores_query_when_block_opts_out() {
    let harness = Harness::new(config_with(Duration::from_secs(5)));
    harness.page(r#"{"main": ["menu"]}"#);
    harness.block(
        block("menu", "<nav>{{ request.path }}</nav>")
            .with_value("cache", "10")
            .with_value("cache_noquery", "true"),
    );

    for query in ["a=1", "a=2", ""] {
        harness
            .pages
            .render_page(PAGE_ID, RequestContext::new("/news", query), Map::new(), true)
            .await
            .expect("page renders");
    }

    assert_eq!(harness.engine.renders("menu"), 1);
    assert_eq!(harness.store.keys_for_page(support::PAGE_UID).len(), 1);
}

#[tokio::test]
async fn missing_page_and_empty_block_set_are_errors() {
    let harness = Harness::new(config_with(Duration::from_secs(5)));
    let missing = harness
        .pages
        .render_page(PAGE_ID, RequestContext::new("/", ""), Map::new(), true)
        .await;
    assert!(matches!(missing, Err(PageError::MissingPage { .. })));

    harness.page(SCHEME);
    let empty = harness
        .pages
        .render_page(PAGE_ID, RequestContext::new("/", ""), Map::new(), true)
        .await;
    assert!(matches!(empty, Err(PageError::EmptyBlockSet { .. })));
}

#[tokio::test]
async fn cache_can_be_skipped_for_a_single_build() {
    let harness = Harness::new(config_with(Duration::from_secs(5)));
    harness.page(r#"{"main": ["alpha"]}"#);
    harness.block(block("alpha", "<p>alpha</p>").with_value("cache", "10"));

    let first = render(&harness).await;
    assert_eq!(first.results["alpha"].stats.cache, CacheOutcome::Miss);

    let uncached = harness
        .pages
        .render_page(PAGE_ID, RequestContext::new("/", ""), Map::new(), false)
        .await
        .expect("page renders");
    assert_eq!(uncached.results["alpha"].stats.cache, CacheOutcome::Bypass);
    assert_eq!(uncached.results["alpha"].stats.status, BuildStatus::Rendered);
    assert_eq!(harness.engine.renders("alpha"), 2);

    let cached = render(&harness).await;
    assert_eq!(cached.results["alpha"].stats.cache, CacheOutcome::Hit);
    assert_eq!(harness.engine.renders("alpha"), 2);
    assert_eq!(harness.store.len(), 1);
}

#[tokio::test]
async fn declared_queries_fill_datasets_using_the_block_filter() {
    let harness = Harness::new(config_with(Duration::from_secs(5)));
    harness.content.insert_query("articles", articles());
    harness.page(r#"{"main": ["latest"]}"#);
    harness.block(
        block(
            "latest",
            "{{ datasets.items.ids | join(\",\") }}/{{ datasets.items.data[1].title }}/\
             {{ datasets.items.pagination.total_records }}/{{ datasets.items.pagination.last_page }}",
        )
        .with_value("filter", "@form(tag)")
        .with_value(
            "configuration",
            r#"{"queries": [{"name": "articles", "dataset": "items"}]}"#,
        ),
    );

    let page = harness
        .pages
        .render_page(PAGE_ID, RequestContext::new("/", "tag=rust"), Map::new(), true)
        .await
        .expect("page renders");

    assert_eq!(page.results["latest"].html, "rust-2024,survey/Rust survey/2/1");
    assert_eq!(harness.content.queries_run(), 1);
}

#[tokio::test]
async fn failing_sub_query_renders_inline_and_spares_siblings() {
    let harness = Harness::new(config_with(Duration::from_secs(5)));
    harness.page(r#"{"main": ["alpha", "feed"]}"#);
    harness.block(block("alpha", "<p>ok</p>"));
    harness.block(
        block("feed", "<p>{{ datasets.missing.ids }}</p>")
            .with_value("configuration", r#"{"queries": [{"name": "missing"}]}"#),
    );

    let page = render(&harness).await;

    assert_eq!(page.stats.errors, 1);
    assert_eq!(page.results["alpha"].html, "<p>ok</p>");
    let feed = &page.results["feed"];
    assert!(matches!(
        feed.error,
        Some(BuildError::Repo(RepoError::UnknownQuery { .. }))
    ));
    assert!(feed.html.contains("unknown query `missing`"));
    assert_eq!(harness.engine.renders("feed"), 0);
}

#[tokio::test]
async fn page_with_unknown_layout_is_an_error() {
    let harness = Harness::new(config_with(Duration::from_secs(5)));
    harness.content.insert_object(
        ContentObject::new(support::PAGE_UID, PAGE_ID, "Home")
            .with_value("layout", "nowhere")
            .with_value("scheme", SCHEME),
    );
    harness.block(block("alpha", "<p>a</p>"));

    let result = harness
        .pages
        .render_page(PAGE_ID, RequestContext::new("/", ""), Map::new(), true)
        .await;

    assert!(matches!(
        result,
        Err(PageError::MissingLayout { ref layout, .. }) if layout == "nowhere"
    ));
    assert_eq!(harness.engine.renders("alpha"), 0);
}
