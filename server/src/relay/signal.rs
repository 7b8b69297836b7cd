//! One-shot session cancellation signal

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use super::error::ExitReason;

/// Cancellation shared by every execution unit of a session.
///
/// The first `trigger` records its reason; later calls only re-cancel the
/// (already cancelled) token and report `false`.
#[derive(Debug, Default)]
pub struct StopSignal {
    token: CancellationToken,
    reason: OnceLock<ExitReason>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal. Returns `true` only for the call that won.
    pub fn trigger(&self, reason: ExitReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<&ExitReason> {
        self.reason.get()
    }

    /// Completes once the signal has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// `false` once a trigger says the client can no longer take frames.
    pub fn sink_usable(&self) -> bool {
        self.reason().map_or(true, ExitReason::sink_usable)
    }
}
