pub mod config;
pub mod credentials;
pub mod errors;
pub mod fetcher;
pub mod forwarder;
pub mod metrics_defs;
pub mod naming;
pub mod orchestrator;
pub mod protocol;
pub mod service;
pub mod types;

#[cfg(test)]
mod testutils;

use config::{Config, ValidationError};
use orchestrator::Relay;
use service::RelayService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("invalid relay config: {0}")]
    Validation(#[from] ValidationError),
    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs the relay listener and the admin listener until either fails.
pub async fn run(config: Config) -> Result<(), RunError> {
    config.validate()?;

    let relay = Arc::new(Relay::new(&config)?);
    if !relay.is_configured() {
        tracing::warn!(
            "No ingestion API key configured (set {}); every relay request will fail",
            config::API_KEY_ENV
        );
    }
    if config.credentials.refresh().is_none() {
        tracing::info!("Refresh credentials not configured; callers must supply access tokens");
    }

    let relay_service = RelayService::new(relay.clone(), &config);
    let admin_service = AdminService::new(move || relay.is_configured());

    let relay_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        relay_service,
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(relay_task, admin_task)?;
    Ok(())
}
