use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "quill_feed_cache_hit_total",
            Unit::Count,
            "Feed pages served from the page cache."
        );
        describe_counter!(
            "quill_feed_cache_miss_total",
            Unit::Count,
            "Feed pages rendered because the page cache had no fresh entry."
        );
        describe_counter!(
            "quill_feed_cache_error_total",
            Unit::Count,
            "Page cache operations that failed and fell back to recomputation."
        );
        describe_counter!(
            "quill_feed_cache_invalidated_total",
            Unit::Count,
            "Cached feed pages dropped by post mutations."
        );
        describe_counter!(
            "quill_feed_cache_evict_total",
            Unit::Count,
            "Cached feed pages evicted due to capacity."
        );
        describe_gauge!(
            "quill_feed_cache_entries",
            Unit::Count,
            "Feed pages currently held by the page cache."
        );
        describe_histogram!(
            "quill_feed_render_ms",
            Unit::Milliseconds,
            "Time to query and render one feed page on a cache miss."
        );
    });
}
