//! Live container log relay
//!
//! One [`RelaySession`] per WebSocket client. The session owns the runtime log
//! source and the client connection and runs four execution units over them:
//! - read loop: source -> bounded relay channel
//! - write loop: relay channel -> client, plus heartbeat pings
//! - inbound loop: client close detection and heartbeat acknowledgements
//! - liveness monitor: peer silence deadline and process shutdown
//!
//! All of them observe a single [`StopSignal`]; teardown happens in a fixed
//! order once every unit has returned.

mod channel;
mod error;
mod liveness;
mod registry;
mod session;
mod signal;
mod sink;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

pub use channel::{relay_channel, RelayChunk};
pub use error::{ExitReason, RelayError};
pub use registry::{Registration, RelayRegistry};
pub use session::{RelaySession, SessionReport, SessionState};
pub use signal::StopSignal;
pub use sink::{OriginPolicy, SinkConnection, SinkFactory, HEARTBEAT_PAYLOAD};

/// Tuning for one relay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayLimits {
    /// Upper bound on the bytes of one source read, and so of one frame.
    pub read_buffer_size: usize,
    /// Chunks buffered between the read loop and the write loop.
    pub channel_capacity: usize,
    pub write_timeout: Duration,
    pub liveness_deadline: Duration,
    pub heartbeat_interval: Duration,
    pub liveness_check_interval: Duration,
    /// Largest message accepted from the client.
    pub max_message_bytes: usize,
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self {
            read_buffer_size: 2048,
            channel_capacity: 8,
            write_timeout: Duration::from_secs(10),
            liveness_deadline: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
            liveness_check_interval: Duration::from_secs(5),
            max_message_bytes: 512 * 1024,
        }
    }
}
