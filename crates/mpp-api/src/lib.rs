//! MPP API /v1: REST endpoints over the refinement engine
pub mod config;
pub mod factory;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod state;

pub use config::{RoleModels, ServiceConfig, DEFAULT_ADDR};
pub use factory::LlmProgramFactory;
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub const DEFAULT_LOG_FILTER: &str = "info,mpp_api=debug,tower_http=debug";

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/v1/bundle/validate", post(handlers::validate_bundle))
        .route("/v1/template/blocks", post(handlers::template_blocks))
        .route("/v1/template/render", post(handlers::template_render))
        .route("/v1/refine", post(handlers::refine))
        .route("/v1/optimize", post(handlers::optimize))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::cors())
        .layer(middleware::trace())
        .with_state(state)
}

pub async fn serve(addr: &str, state: Arc<AppState>) -> std::io::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("MPP API listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}
