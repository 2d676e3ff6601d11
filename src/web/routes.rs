//! Router composition for the two listeners named in the external
//! interfaces: a WebSocket gateway and a plain static-file HTTP server.

use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::gateway::ws_handler;
use super::static_files::static_file_router;
use crate::state::AppState;

async fn health_check() -> &'static str {
    "ok"
}

/// The WebSocket gateway listener's router (`WEBSOCKET_PORT`).
pub fn gateway_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/", any(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// The static-file listener's router (`HTTP_PORT`).
pub fn static_router(static_dir: &str) -> Router {
    static_file_router(static_dir)
}
