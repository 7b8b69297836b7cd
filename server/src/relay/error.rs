//! Relay error kinds and session exit reasons

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame};
use thiserror::Error;

/// Errors that end a relay session.
///
/// Every kind is local to its session: it triggers cancellation and a graceful
/// drain, never a process-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("container not found: {0}")]
    TargetNotFound(String),

    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("client write exceeded {0:?} deadline")]
    SinkWriteTimeout(Duration),

    #[error("client connection closed: {0}")]
    SinkClosed(String),

    #[error("no activity from client within {0:?}")]
    PeerTimeout(Duration),

    #[error("client message of {size} bytes exceeds the {limit} byte limit")]
    BufferCapacityExceeded { size: usize, limit: usize },
}

impl RelayError {
    /// Whether the client connection can still take frames after this error.
    pub fn sink_usable(&self) -> bool {
        matches!(
            self,
            RelayError::TargetNotFound(_) | RelayError::RuntimeUnavailable(_)
        )
    }
}

/// Why a session left the `Streaming` state. Recorded once, by the first trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The container stopped emitting logs.
    EndOfStream,
    /// Cancelled through the relay registry.
    Cancelled,
    /// The process is shutting down.
    Shutdown,
    Failed(RelayError),
}

impl ExitReason {
    pub fn sink_usable(&self) -> bool {
        match self {
            ExitReason::Failed(err) => err.sink_usable(),
            _ => true,
        }
    }

    /// Close frame sent to the client on teardown, if it can still receive one.
    pub fn close_frame(&self) -> Option<CloseFrame<'static>> {
        let (code, reason) = match self {
            ExitReason::EndOfStream => (close_code::NORMAL, "log stream ended"),
            ExitReason::Cancelled => (close_code::AWAY, "relay cancelled"),
            ExitReason::Shutdown => (close_code::AWAY, "server shutting down"),
            ExitReason::Failed(err) if err.sink_usable() => (close_code::ERROR, "log stream failed"),
            ExitReason::Failed(_) => return None,
        };
        Some(CloseFrame {
            code,
            reason: Cow::Borrowed(reason),
        })
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ExitReason::EndOfStream => "end_of_stream",
            ExitReason::Cancelled => "cancelled",
            ExitReason::Shutdown => "shutdown",
            ExitReason::Failed(RelayError::TargetNotFound(_)) => "target_not_found",
            ExitReason::Failed(RelayError::RuntimeUnavailable(_)) => "runtime_unavailable",
            ExitReason::Failed(RelayError::SinkWriteTimeout(_)) => "sink_write_timeout",
            ExitReason::Failed(RelayError::SinkClosed(_)) => "sink_closed",
            ExitReason::Failed(RelayError::PeerTimeout(_)) => "peer_timeout",
            ExitReason::Failed(RelayError::BufferCapacityExceeded { .. }) => {
                "buffer_capacity_exceeded"
            }
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::EndOfStream => f.write_str("end of stream"),
            ExitReason::Cancelled => f.write_str("cancelled"),
            ExitReason::Shutdown => f.write_str("shutdown"),
            ExitReason::Failed(err) => write!(f, "{err}"),
        }
    }
}

impl From<RelayError> for ExitReason {
    fn from(err: RelayError) -> Self {
        ExitReason::Failed(err)
    }
}
