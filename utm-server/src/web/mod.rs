//! Web server — axum REST API plus WebSocket transports.
//!
//! Shared state is a handful of long-lived handles built once at startup
//! and passed by reference; there is no ambient global lookup anywhere.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::access::AccessPolicy;
use crate::db::Db;
use crate::pipeline::IngestPipeline;

pub mod routes;
pub mod ws;

pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub access: Arc<dyn AccessPolicy>,
    pub db: Db,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(routes::api_health))
        .route("/api/v1/stats", get(routes::api_stats))
        .route("/api/v1/telemetry", post(routes::api_submit_telemetry))
        .route("/api/v1/routes/check", post(routes::api_check_route))
        .route(
            "/api/v1/airspace/refresh",
            post(routes::api_refresh_airspace),
        )
        .route("/ws/feed", get(ws::feed_ws))
        .route("/ws/drones/:drone_id", get(ws::drone_ws))
        .with_state(state)
        .layer(cors)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, bind: &str) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "utm server listening");
    axum::serve(listener, app).await
}
