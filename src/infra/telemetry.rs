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
            "bestdeal_http_requests_total",
            Unit::Count,
            "Total number of HTTP requests by method and status."
        );
        describe_histogram!(
            "bestdeal_http_request_ms",
            Unit::Milliseconds,
            "Request latency in milliseconds, measured inside panic recovery."
        );
        describe_counter!(
            "bestdeal_http_panics_total",
            Unit::Count,
            "Total number of handler panics converted into 500 responses."
        );
        describe_counter!(
            "bestdeal_csrf_rejections_total",
            Unit::Count,
            "Total number of state-changing requests rejected by CSRF protection."
        );
        describe_counter!(
            "bestdeal_template_render_total",
            Unit::Count,
            "Total number of page renders by template and outcome."
        );
    });
}
