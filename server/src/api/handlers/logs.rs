//! Live container log relay over WebSocket

use std::sync::Arc;

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use tracing::{info, warn};

use crate::api::ApiError;
use crate::relay::RelaySession;
use crate::AppState;

/// Upgrade to a WebSocket and relay the container's log into it until one
/// side stops.
pub async fn stream_container_logs(
    ws: WebSocketUpgrade,
    Path(container_id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    if !state.sinks.permits(&headers) {
        warn!(
            container_id = %container_id,
            origin = ?headers.get(axum::http::header::ORIGIN),
            "Rejected log stream from disallowed origin"
        );
        return Err(ApiError::Forbidden);
    }

    if state.relays.shutdown_token().is_cancelled() {
        return Err(ApiError::ServiceUnavailable(
            "server is shutting down".to_string(),
        ));
    }

    // Unknown containers are refused before the upgrade
    state.runtime.inspect_target(&container_id).await?;

    let session = Arc::new(RelaySession::new(
        container_id,
        state.config.relay.limits(),
    ));
    info!(
        session_id = %session.session_id,
        container_id = %session.container_id,
        "Log relay requested"
    );

    let relay_state = state.clone();
    Ok(state.sinks.upgrade(ws, move |sink, inbound| async move {
        let _registration = relay_state.relays.register(session.clone()).await;

        let shutdown = relay_state.relays.shutdown_token();
        let report = session
            .run(relay_state.runtime.as_ref(), sink, inbound, &shutdown)
            .await;

        crate::metrics::record_relay_closed(&report);
    }))
}
