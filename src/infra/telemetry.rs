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

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr; stdout carries command output.
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
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
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

/// Register descriptions for every metric the crate emits. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "patisserie_query_fetch_total",
            Unit::Count,
            "Total number of query fetches started."
        );
        describe_counter!(
            "patisserie_query_fetch_discarded_total",
            Unit::Count,
            "Fetch results dropped because a newer fetch superseded them or the entry was removed."
        );
        describe_counter!(
            "patisserie_query_dedup_total",
            Unit::Count,
            "Subscriptions that attached to an in-flight fetch instead of issuing a new one."
        );
        describe_counter!(
            "patisserie_query_evict_total",
            Unit::Count,
            "Query entries evicted by garbage collection or explicit removal."
        );
        describe_counter!(
            "patisserie_mutation_total",
            Unit::Count,
            "Mutations by entity and outcome."
        );
        describe_histogram!(
            "patisserie_mutation_ms",
            Unit::Milliseconds,
            "Mutation latency in milliseconds, from claim to completion."
        );
        describe_counter!(
            "patisserie_upload_total",
            Unit::Count,
            "Blob uploads by outcome."
        );
    });
}
