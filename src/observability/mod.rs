//! Observability: structured logging, metrics, and request correlation.

mod logging;
mod metrics;
mod request_context;

pub use logging::{DEFAULT_LOG_FILTER, LogFormat, LoggingConfig, VERBOSE_LOG_FILTER};
pub use metrics::{DEFAULT_METRICS_PORT, MetricsConfig, install_prometheus};
pub use request_context::{
    REQUEST_ID_HEADER, RequestContext, RequestContextGuard, current_request_context,
    current_request_id, enter_request_context, scope_request_context,
};

use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Full observability configuration.
#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
    /// Whether to expose metrics via HTTP listener.
    pub metrics_expose: bool,
}

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Initializes logging and metrics for the process.
///
/// # Errors
///
/// Returns an error if observability has already been initialized or if the
/// subscriber or metrics recorder cannot be installed.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::operation(
            "observability_init",
            "observability already initialized",
        ));
    }

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true)
                        .with_thread_names(true)
                        .with_writer(std::io::stderr),
                )
                .with(config.logging.env_filter())
                .try_init()
                .map_err(init_error)?;
        },
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_thread_names(true)
                        .with_writer(std::io::stderr),
                )
                .with(config.logging.env_filter())
                .try_init()
                .map_err(init_error)?;
        },
    }

    // The exporter serves scrapes itself; the returned handle is not needed.
    install_prometheus(&config.metrics, config.metrics_expose)?;

    OBSERVABILITY_INIT
        .set(())
        .map_err(|()| Error::operation("observability_init", "failed to mark observability initialized"))?;

    tracing::debug!(
        format = %config.logging.format,
        filter = %config.logging.filter,
        metrics = config.metrics.enabled,
        "Observability initialized"
    );

    Ok(())
}

/// Helper to convert init errors.
#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::operation("observability_init", e)
}
