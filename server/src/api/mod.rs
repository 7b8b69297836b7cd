//! API module for the dockweb server
//!
//! Provides endpoints for:
//! - Live container log relay (WebSocket)
//! - Relay session management
//! - Health checks and metrics

mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::AppState;

pub use error::ApiError;
pub use handlers::health::mark_started;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Relay connections live as long as the client wants, so no request timeout here
        .route(
            "/api/v1/containers/:id/logs",
            get(handlers::logs::stream_container_logs),
        )
        .merge(rest_routes(&state))
        .with_state(state)
}

/// Plain request/response routes
fn rest_routes(state: &AppState) -> Router<Arc<AppState>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))
        // Prometheus metrics
        .route("/metrics", get(crate::metrics::metrics_handler))
        // Relay management
        .route("/api/v1/relays", get(handlers::relays::list_relays))
        .route(
            "/api/v1/relays/:session_id",
            delete(handlers::relays::cancel_relay),
        )
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_bytes))
}
