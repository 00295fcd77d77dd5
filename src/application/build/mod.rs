//! Block and page build pipeline.

mod block;
mod page;
mod types;

pub use block::{BlockBuilder, BlockConfiguration, BuildScope, DeclaredQuery};
pub use page::BuildOrchestrator;
pub use types::{
    BlockStats, BuildConfig, BuildError, DEFAULT_BLOCK_RELATION, DEFAULT_DEADLINE_MS, DEFAULT_DOMAIN, BuildResult, BuildStatus, CacheOutcome, PageBuild,
    PageStats, error_html,
};
