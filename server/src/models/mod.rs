//! Data models for the dockweb server
//!
//! Request/response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::relay::SessionState;

// ============================================================================
// Health Models
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_relays: u64,
    #[serde(default)]
    pub runtime_version: Option<String>,
}

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

// ============================================================================
// Relay Models
// ============================================================================

/// One active log relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySummary {
    pub session_id: Uuid,
    pub container_id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub frames_sent: u64,
    pub bytes_forwarded: u64,
}

/// Active relays listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayListResponse {
    pub relays: Vec<RelaySummary>,
    pub total: usize,
}

// ============================================================================
// Error Models
// ============================================================================

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
