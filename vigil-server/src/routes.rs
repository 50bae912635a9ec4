use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    executions_ws, notifications_ws, scans_api, scans_ws,
};
use crate::infra::app_state::AppState;

/// Assemble the full HTTP + WebSocket surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(scans_api::health))
        .route(
            "/api/scans",
            post(scans_api::create_scan).get(scans_api::list_scans),
        )
        .route("/api/scans/{id}", get(scans_api::get_scan))
        .route("/ws/scans", get(scans_ws::websocket_handler))
        .route(
            "/ws/notifications",
            get(notifications_ws::websocket_handler),
        )
        .route("/ws/executions", get(executions_ws::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
