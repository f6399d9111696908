//! Binary entrypoint for the MPP API server.
use anyhow::Context;
use mpp_api::{serve, AppState, ServiceConfig, DEFAULT_LOG_FILTER};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    // MPP_CONFIG, MPP_ADDR and MPP_API_KEY override the defaults
    let config = ServiceConfig::from_env().context("loading configuration")?;
    let addr = config.addr.clone();
    let state = AppState::from_config(config).context("building service state")?;

    serve(&addr, Arc::new(state))
        .await
        .with_context(|| format!("serving on {}", addr))
}
