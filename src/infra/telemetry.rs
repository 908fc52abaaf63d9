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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "thumbd_cache_hit_total",
            Unit::Count,
            "Thumbnails served from an existing cache entry."
        );
        describe_counter!(
            "thumbd_cache_miss_total",
            Unit::Count,
            "Thumbnails that had to be generated."
        );
        describe_counter!(
            "thumbd_cache_sentinel_total",
            Unit::Count,
            "Requests short-circuited by a recent fetch failure sentinel."
        );
        describe_counter!(
            "thumbd_cache_corrupt_total",
            Unit::Count,
            "Cache entries discarded because their header was invalid."
        );
        describe_counter!(
            "thumbd_fetch_failure_total",
            Unit::Count,
            "External image fetches that failed, labelled by reason."
        );
        describe_histogram!(
            "thumbd_transform_ms",
            Unit::Milliseconds,
            "Image transform latency in milliseconds."
        );
    });
}
