//! Peer liveness tracking
//!
//! A half-open TCP connection surfaces no read or write errors for a long
//! time. The monitor requires some inbound activity (usually a pong answering
//! the heartbeat ping) within the deadline and cancels the session otherwise.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::error::{ExitReason, RelayError};
use super::signal::StopSignal;

/// Last observed peer activity, lock-free.
#[derive(Debug)]
pub struct LivenessState {
    epoch: Instant,
    last_seen_ms: AtomicU64,
    deadline: Duration,
}

impl LivenessState {
    pub fn new(deadline: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
            deadline,
        }
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_seen_ms.fetch_max(now, Ordering::Relaxed);
    }

    pub fn silence(&self) -> Duration {
        let last_seen = Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last_seen)
    }

    pub fn is_expired(&self) -> bool {
        self.silence() > self.deadline
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

/// Periodic deadline check, independent of message traffic.
#[derive(Debug)]
pub struct LivenessMonitor {
    state: LivenessState,
    period: Duration,
}

impl LivenessMonitor {
    pub fn new(deadline: Duration, period: Duration) -> Self {
        Self {
            state: LivenessState::new(deadline),
            period,
        }
    }

    pub fn state(&self) -> &LivenessState {
        &self.state
    }

    /// Run until the session signal fires.
    ///
    /// Also turns process shutdown into the session's `Shutdown` exit.
    pub async fn run(&self, signal: &StopSignal, shutdown: &CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = signal.triggered() => break,
                _ = shutdown.cancelled() => {
                    signal.trigger(ExitReason::Shutdown);
                    break;
                }
                _ = ticker.tick() => {
                    if self.state.is_expired() {
                        warn!(
                            silence_ms = self.state.silence().as_millis() as u64,
                            deadline_ms = self.state.deadline().as_millis() as u64,
                            "Peer liveness deadline exceeded"
                        );
                        signal.trigger(ExitReason::Failed(RelayError::PeerTimeout(
                            self.state.deadline(),
                        )));
                        break;
                    }
                }
            }
        }
    }
}
