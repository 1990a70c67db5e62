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

/// Registers units and help texts of the query cache metrics.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "callboard_query_fetch_total",
            Unit::Count,
            "Total number of settled query fetches, by outcome."
        );
        describe_counter!(
            "callboard_query_dedup_total",
            Unit::Count,
            "Total number of fetch requests joined to one already in flight."
        );
        describe_counter!(
            "callboard_query_retry_total",
            Unit::Count,
            "Total number of fetch attempts retried after a failure."
        );
        describe_histogram!(
            "callboard_query_fetch_ms",
            Unit::Milliseconds,
            "Latency of a single fetch attempt in milliseconds."
        );
        describe_counter!(
            "callboard_query_mutation_total",
            Unit::Count,
            "Total number of settled mutations, by outcome."
        );
        describe_histogram!(
            "callboard_query_mutation_ms",
            Unit::Milliseconds,
            "Mutation latency including retries in milliseconds."
        );
        describe_counter!(
            "callboard_query_invalidate_total",
            Unit::Count,
            "Total number of entries marked stale by invalidation."
        );
        describe_gauge!(
            "callboard_query_entries",
            Unit::Count,
            "Current number of cached query entries."
        );
        describe_gauge!(
            "callboard_query_stale_entries",
            Unit::Count,
            "Number of stale entries seen by the last garbage-collection sweep."
        );
        describe_counter!(
            "callboard_query_gc_evict_total",
            Unit::Count,
            "Total number of entries evicted by garbage collection."
        );
        describe_counter!(
            "callboard_query_evict_total",
            Unit::Count,
            "Total number of entries evicted due to capacity."
        );
    });
}
