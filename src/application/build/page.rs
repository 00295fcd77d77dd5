//! Page-level fan-out of block builds.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use super::{
    block::{BlockBuilder, BuildScope},
    types::{BuildResult, BuildStatus, PageBuild, PageStats},
};
use crate::domain::{entities::Block, scheme::Scheme, types::BuildStrategy};

const METRIC_PAGE_BUILD_MS: &str = "tessera_page_build_ms";
const METRIC_PAGE_TIMEOUT: &str = "tessera_page_timeout_total";

#[derive(Clone)]
pub struct BuildOrchestrator {
    builder: BlockBuilder,
}

impl BuildOrchestrator {
    pub fn new(builder: BlockBuilder) -> Self {
        Self { builder }
    }

    /// Build every block listed in `scheme`, giving up on whatever is still
    /// running once `deadline` elapses.
    #[instrument(
        skip_all,
        fields(page_id = %scope.page.id, strategy = %strategy, blocks = blocks.len())
    )]
    pub async fn build_page(
        &self,
        blocks: &[Block],
        scheme: &Scheme,
        scope: &BuildScope,
        deadline: Duration,
        strategy: BuildStrategy,
    ) -> PageBuild {
        let started_at = self.builder.cache().clock().now();
        let timer = Instant::now();

        let eligible: Vec<&Block> = blocks
            .iter()
            .filter(|block| scheme.contains(block.key()) || scheme.contains(block.uid()))
            .collect();
        debug!(eligible = eligible.len(), "blocks selected by scheme");

        let (results, timed_out) = match strategy {
            BuildStrategy::Sequential => self.sequential(&eligible, scope, deadline).await,
            BuildStrategy::Concurrent => self.concurrent(&eligible, scope, deadline).await,
        };

        let elapsed = timer.elapsed();
        histogram!(METRIC_PAGE_BUILD_MS).record(elapsed.as_secs_f64() * 1000.0);
        if timed_out {
            counter!(METRIC_PAGE_TIMEOUT).increment(1);
            warn!(
                completed = results.len(),
                dispatched = eligible.len(),
                "page build hit its deadline"
            );
        }

        let blocks = eligible
            .iter()
            .filter_map(|block| results.get(block.key()))
            .map(|result| result.stats.clone())
            .collect::<Vec<_>>();
        let stats = PageStats {
            strategy,
            started_at,
            elapsed,
            dispatched: eligible.len(),
            completed: results.len(),
            errors: blocks
                .iter()
                .filter(|stats| stats.status == BuildStatus::Error)
                .count(),
            cache_hits: blocks
                .iter()
                .filter(|stats| stats.status == BuildStatus::Cached)
                .count(),
            timed_out,
            blocks,
        };
        info!(
            completed = stats.completed,
            errors = stats.errors,
            cache_hits = stats.cache_hits,
            elapsed_ms = elapsed.as_millis() as u64,
            "page built"
        );

        PageBuild {
            results,
            stats,
            timed_out,
        }
    }

    async fn sequential(
        &self,
        blocks: &[&Block],
        scope: &BuildScope,
        deadline: Duration,
    ) -> (BTreeMap<String, BuildResult>, bool) {
        let cancel = CancellationToken::new();
        let timer = Instant::now();
        let mut results = BTreeMap::new();

        for block in blocks {
            let Some(remaining) = deadline.checked_sub(timer.elapsed()).filter(|left| !left.is_zero())
            else {
                return (results, true);
            };
            match tokio::time::timeout(remaining, self.builder.build_block(block, scope, &cancel))
                .await
            {
                Ok(result) => {
                    results.insert(result.block_id.clone(), result);
                }
                Err(_) => {
                    debug!(block_id = %block.key(), "block abandoned at deadline");
                    return (results, true);
                }
            }
        }

        (results, false)
    }

    async fn concurrent(
        &self,
        blocks: &[&Block],
        scope: &BuildScope,
        deadline: Duration,
    ) -> (BTreeMap<String, BuildResult>, bool) {
        let mut results = BTreeMap::new();
        if blocks.is_empty() {
            return (results, false);
        }

        let cancel = CancellationToken::new();
        // One slot per task, so no send ever waits.
        let (tx, mut rx) = mpsc::channel::<BuildResult>(blocks.len());

        for block in blocks {
            let tx = tx.clone();
            let builder = self.builder.clone();
            let block = (*block).clone();
            let scope = scope.clone();
            let cancel = cancel.clone();
            let span = info_span!("block_build", block_id = %block.key());

            tokio::spawn(
                async move {
                    let result = builder.build_block(&block, &scope, &cancel).await;
                    if tx.send(result).await.is_err() {
                        debug!("result arrived after the page was returned");
                    }
                }
                .instrument(span),
            );
        }
        drop(tx);

        let expiry = tokio::time::sleep(deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Some(result) => {
                        results.insert(result.block_id.clone(), result);
                    }
                    None => return (results, false),
                },
                _ = &mut expiry => {
                    cancel.cancel();
                    while let Ok(result) = rx.try_recv() {
                        results.insert(result.block_id.clone(), result);
                    }
                    return (results, true);
                }
            }
        }
    }
}
