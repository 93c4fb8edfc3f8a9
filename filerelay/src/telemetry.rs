use crate::config::{CommonConfig, MetricsConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const METRICS_PREFIX: &str = "filerelay";

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("could not install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
    #[error("could not build statsd recorder: {0}")]
    Statsd(String),
    #[error("a global metrics recorder is already installed")]
    RecorderInstalled,
}

/// Must be held for the lifetime of the process. Dropping it flushes
/// pending Sentry events.
pub struct TelemetryGuard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Installs the tracing subscriber, the Sentry layer when a DSN is
/// configured, and the statsd recorder when metrics are configured.
pub fn init(common: &CommonConfig) -> Result<TelemetryGuard, TelemetryError> {
    let sentry_guard = common
        .logging
        .as_ref()
        .and_then(|logging| logging.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            sentry_guard
                .as_ref()
                .map(|_| sentry::integrations::tracing::layer()),
        )
        .try_init()?;

    match &common.metrics {
        Some(metrics) => init_metrics(metrics)?,
        None => tracing::info!("Metrics not configured; statsd export disabled"),
    }

    Ok(TelemetryGuard {
        _sentry: sentry_guard,
    })
}

fn init_metrics(config: &MetricsConfig) -> Result<(), TelemetryError> {
    let recorder =
        metrics_exporter_statsd::StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
            .build(Some(METRICS_PREFIX))
            .map_err(|e| TelemetryError::Statsd(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|_| TelemetryError::RecorderInstalled)?;

    shared::metrics_defs::describe_all(relay::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Exporting metrics to statsd"
    );
    Ok(())
}
