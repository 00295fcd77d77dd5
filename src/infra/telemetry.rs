use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber. Events go to stderr so command
/// output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber already set: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "tessera_block_cache_hit_total",
            Unit::Count,
            "Block cache lookups answered by a fresh entry."
        );
        describe_counter!(
            "tessera_block_cache_miss_total",
            Unit::Count,
            "Block cache lookups that found nothing usable."
        );
        describe_counter!(
            "tessera_block_cache_stale_total",
            Unit::Count,
            "Expired block cache entries served while stale."
        );
        describe_counter!(
            "tessera_block_refresh_total",
            Unit::Count,
            "Background block refreshes scheduled after a won claim."
        );
        describe_histogram!(
            "tessera_block_render_ms",
            Unit::Milliseconds,
            "Time to build a block that was not served from cache."
        );
        describe_histogram!(
            "tessera_page_build_ms",
            Unit::Milliseconds,
            "Time to build all blocks of a page."
        );
        describe_counter!(
            "tessera_page_timeout_total",
            Unit::Count,
            "Page builds that returned partial results at the deadline."
        );
        describe_counter!(
            "tessera_lock_poisoned_total",
            Unit::Count,
            "Lock acquisitions that recovered from a poisoned lock."
        );
    });
}
