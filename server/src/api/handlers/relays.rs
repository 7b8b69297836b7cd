//! Active relay session management

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::api::ApiError;
use crate::models::RelayListResponse;
use crate::AppState;

/// List active relay sessions
pub async fn list_relays(State(state): State<Arc<AppState>>) -> Json<RelayListResponse> {
    let relays = state.relays.list().await;
    Json(RelayListResponse {
        total: relays.len(),
        relays,
    })
}

/// Cancel one relay session
pub async fn cancel_relay(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session_id = Uuid::parse_str(&session_id)
        .map_err(|_| ApiError::BadRequest(format!("invalid session id: {session_id}")))?;

    if state.relays.cancel(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("relay session {session_id}")))
    }
}
