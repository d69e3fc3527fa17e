use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
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
        .map_err(|err| TelemetryError(err.to_string()))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "spartito_rpc_request_total",
            Unit::Count,
            "Total number of engine requests dispatched over the channel."
        );
        describe_counter!(
            "spartito_rpc_orphan_response_total",
            Unit::Count,
            "Total number of responses dropped for lack of a pending call."
        );
        describe_counter!(
            "spartito_relayout_coalesced_total",
            Unit::Count,
            "Total number of input changes absorbed into an already pending re-layout window."
        );
        describe_counter!(
            "spartito_render_cycle_total",
            Unit::Count,
            "Total number of completed render cycles."
        );
        describe_histogram!(
            "spartito_render_cycle_ms",
            Unit::Milliseconds,
            "Render cycle latency in milliseconds."
        );
    });
}
