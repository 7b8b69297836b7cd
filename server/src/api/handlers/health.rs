//! Health check handler

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::models::{HealthResponse, HealthStatus};
use crate::AppState;

/// Server start time for uptime calculation
static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Touch the start time so uptime counts from boot, not the first probe.
pub fn mark_started() {
    Lazy::force(&START_TIME);
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = START_TIME.elapsed().as_secs();
    let active_relays = state.relays.active_count().await;

    // Degraded while the runtime is unreachable
    let (status, runtime_version) = match state.runtime.ping().await {
        Ok(info) => (HealthStatus::Healthy, info.version),
        Err(e) => {
            debug!(error = %e, "Runtime ping failed");
            (HealthStatus::Degraded, None)
        }
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        active_relays,
        runtime_version,
    })
}
