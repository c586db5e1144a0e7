use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

/// Directives in this variable replace the configured filter.
const LOG_FILTER_ENV: &str = "ROSTER_LOG";
const CRATE_TARGET: &str = "roster";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the process-wide subscriber and describe the metrics it will see.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(log_filter(logging.level))
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

fn log_filter(level: LevelFilter) -> EnvFilter {
    match std::env::var(LOG_FILTER_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::builder()
            .with_default_directive(level.into())
            .parse_lossy(directives),
        _ => EnvFilter::new(default_directives(level)),
    }
}

/// The crate logs at `level`; dependencies never log above `warn`.
fn default_directives(level: LevelFilter) -> String {
    let dependencies = level.min(LevelFilter::WARN);
    format!("{dependencies},{CRATE_TARGET}={level}")
}

/// Register descriptions for every metric the cache and mutations emit.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_gauge!(
            "roster_cache_entries",
            Unit::Count,
            "Current number of entries held by the query cache."
        );
        describe_counter!(
            "roster_query_fetch_total",
            Unit::Count,
            "Total number of fetches issued by the query client."
        );
        describe_counter!(
            "roster_query_cache_hit_total",
            Unit::Count,
            "Total number of observations served from fresh cache data."
        );
        describe_counter!(
            "roster_query_dedup_total",
            Unit::Count,
            "Total number of observations that joined an in-flight fetch."
        );
        describe_counter!(
            "roster_query_superseded_total",
            Unit::Count,
            "Total number of fetch results dropped because a newer fetch was issued."
        );
        describe_counter!(
            "roster_query_retry_total",
            Unit::Count,
            "Total number of automatic fetch retries."
        );
        describe_histogram!(
            "roster_query_fetch_ms",
            Unit::Milliseconds,
            "Fetch latency in milliseconds, including retries."
        );
        describe_counter!(
            "roster_mutation_total",
            Unit::Count,
            "Total number of settled mutations by outcome."
        );
        describe_histogram!(
            "roster_mutation_ms",
            Unit::Milliseconds,
            "Mutation latency in milliseconds."
        );
    });
}
