//! Relay session: one client, one container log stream

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message};
use chrono::{DateTime, Utc};
use futures::{Sink, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};
use uuid::Uuid;

use crate::models::RelaySummary;
use crate::runtime::{LogSource, RuntimeApi};

use super::channel::{relay_channel, RelayChunk};
use super::error::{ExitReason, RelayError};
use super::liveness::{LivenessMonitor, LivenessState};
use super::signal::StopSignal;
use super::sink::SinkConnection;
use super::RelayLimits;

/// Session lifecycle. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Opening,
    Streaming,
    Draining,
    Closed,
}

/// Outcome of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub container_id: String,
    pub reason: ExitReason,
    pub frames_sent: u64,
    pub bytes_forwarded: u64,
    pub duration: Duration,
}

/// A live log relay between one container and one client.
#[derive(Debug)]
pub struct RelaySession {
    /// Unique session ID
    pub session_id: Uuid,

    /// Container whose logs are relayed
    pub container_id: String,

    /// When the client connected
    pub started_at: DateTime<Utc>,

    limits: RelayLimits,
    signal: StopSignal,
    state: watch::Sender<SessionState>,
    frames_sent: AtomicU64,
    bytes_forwarded: AtomicU64,
}

impl RelaySession {
    pub fn new(container_id: impl Into<String>, limits: RelayLimits) -> Self {
        let (state, _) = watch::channel(SessionState::Opening);
        Self {
            session_id: Uuid::new_v4(),
            container_id: container_id.into(),
            started_at: Utc::now(),
            limits,
            signal: StopSignal::new(),
            state,
            frames_sent: AtomicU64::new(0),
            bytes_forwarded: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Request an explicit stop. Returns `false` if the session was already
    /// stopping or closed.
    pub fn cancel(&self) -> bool {
        self.signal.trigger(ExitReason::Cancelled)
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.signal.reason().cloned()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> RelaySummary {
        RelaySummary {
            session_id: self.session_id,
            container_id: self.container_id.clone(),
            state: self.state(),
            started_at: self.started_at,
            frames_sent: self.frames_sent(),
            bytes_forwarded: self.bytes_forwarded(),
        }
    }

    /// Drive the session from `Opening` to `Closed`.
    ///
    /// `sink` and `inbound` are the two halves of the client connection;
    /// `shutdown` is the process-wide shutdown token.
    pub async fn run<S, E, R, F>(
        &self,
        runtime: &dyn RuntimeApi,
        sink: SinkConnection<S>,
        inbound: R,
        shutdown: &CancellationToken,
    ) -> SessionReport
    where
        S: Sink<Message, Error = E> + Unpin,
        E: std::fmt::Display,
        R: Stream<Item = Result<Message, F>> + Unpin,
        F: std::fmt::Display,
    {
        let span = tracing::info_span!(
            "relay",
            session_id = %self.session_id,
            container_id = %self.container_id
        );
        self.run_inner(runtime, sink, inbound, shutdown)
            .instrument(span)
            .await
    }

    async fn run_inner<S, E, R, F>(
        &self,
        runtime: &dyn RuntimeApi,
        mut sink: SinkConnection<S>,
        mut inbound: R,
        shutdown: &CancellationToken,
    ) -> SessionReport
    where
        S: Sink<Message, Error = E> + Unpin,
        E: std::fmt::Display,
        R: Stream<Item = Result<Message, F>> + Unpin,
        F: std::fmt::Display,
    {
        let started = Instant::now();
        info!("Relay session opening");

        let opened = tokio::select! {
            biased;
            _ = self.signal.triggered() => None,
            _ = shutdown.cancelled() => {
                self.signal.trigger(ExitReason::Shutdown);
                None
            }
            opened = runtime.open_log_stream(&self.container_id) => Some(opened),
        };

        let mut source = match opened {
            Some(Ok(source)) => source,
            Some(Err(err)) => {
                warn!(error = %err, "Failed to open log stream");
                self.signal.trigger(ExitReason::Failed(err.clone()));
                if sink.send(diagnostic_frame(&err)).await.is_ok() {
                    sink.close(Some(CloseFrame {
                        code: close_code::ERROR,
                        reason: "log stream unavailable".into(),
                    }))
                    .await;
                }
                sink.abandon();
                return self.finish(started);
            }
            None => {
                self.close_sink(&mut sink).await;
                return self.finish(started);
            }
        };

        self.state.send_replace(SessionState::Streaming);
        debug!("Relay session streaming");

        let (tx, rx) = relay_channel(self.limits.channel_capacity);
        let monitor = LivenessMonitor::new(
            self.limits.liveness_deadline,
            self.limits.liveness_check_interval,
        );

        tokio::join!(
            self.read_loop(&mut source, tx),
            self.write_loop(&mut sink, rx),
            self.inbound_loop(&mut inbound, monitor.state()),
            monitor.run(&self.signal, shutdown),
            self.mark_draining(),
        );

        // Every unit has returned: the channel is closed and drained.
        self.close_sink(&mut sink).await;
        source.close();
        self.finish(started)
    }

    async fn mark_draining(&self) {
        self.signal.triggered().await;
        self.state.send_if_modified(|state| {
            if *state == SessionState::Streaming {
                *state = SessionState::Draining;
                true
            } else {
                false
            }
        });
        debug!(reason = ?self.signal.reason(), "Relay session draining");
    }

    async fn read_loop(&self, source: &mut LogSource, tx: mpsc::Sender<RelayChunk>) {
        let mut buf = vec![0u8; self.limits.read_buffer_size.max(1)];

        loop {
            let read = tokio::select! {
                biased;
                _ = self.signal.triggered() => break,
                read = source.read(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!("Log stream reached end");
                    self.signal.trigger(ExitReason::EndOfStream);
                    break;
                }
                Ok(n) => {
                    let chunk = RelayChunk::copy_from(&buf[..n]);
                    tokio::select! {
                        biased;
                        _ = self.signal.triggered() => break,
                        sent = tx.send(chunk) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Log stream read failed");
                    self.signal.trigger(ExitReason::Failed(RelayError::RuntimeUnavailable(
                        e.to_string(),
                    )));
                    break;
                }
            }
        }
        // Dropping `tx` here closes the relay channel.
    }

    async fn write_loop<S, E>(
        &self,
        sink: &mut SinkConnection<S>,
        mut rx: mpsc::Receiver<RelayChunk>,
    ) where
        S: Sink<Message, Error = E> + Unpin,
        E: std::fmt::Display,
    {
        let period = self.limits.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Buffered chunks are flushed only while the client can take them.
            if !self.signal.sink_usable() {
                break;
            }

            // Heartbeats go first: they must not starve behind a busy channel.
            tokio::select! {
                biased;
                _ = heartbeat.tick(), if !self.signal.is_triggered() => {
                    trace!("Sending heartbeat");
                    if let Err(err) = sink.send_heartbeat().await {
                        warn!(error = %err, "Heartbeat write failed");
                        self.signal.trigger(ExitReason::Failed(err));
                        break;
                    }
                }
                chunk = rx.recv() => {
                    let Some(chunk) = chunk else { break };
                    if !self.signal.sink_usable() {
                        break;
                    }
                    let len = chunk.len() as u64;
                    if let Err(err) = sink.send(chunk.into_frame()).await {
                        warn!(error = %err, "Client write failed");
                        self.signal.trigger(ExitReason::Failed(err));
                        break;
                    }
                    self.frames_sent.fetch_add(1, Ordering::Relaxed);
                    self.bytes_forwarded.fetch_add(len, Ordering::Relaxed);
                    crate::metrics::record_relay_frame(len);
                }
                // Wake up to re-check whether draining is still allowed.
                _ = self.signal.triggered(), if !self.signal.is_triggered() => {}
            }
        }
    }

    async fn inbound_loop<R, F>(&self, inbound: &mut R, liveness: &LivenessState)
    where
        R: Stream<Item = Result<Message, F>> + Unpin,
        F: std::fmt::Display,
    {
        let limit = self.limits.max_message_bytes;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.signal.triggered() => break,
                next = inbound.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    debug!(error = %e, "Client read failed");
                    self.signal.trigger(ExitReason::Failed(RelayError::SinkClosed(format!(
                        "read failed: {e}"
                    ))));
                    break;
                }
                None => {
                    self.signal.trigger(ExitReason::Failed(RelayError::SinkClosed(
                        "client disconnected".into(),
                    )));
                    break;
                }
            };

            liveness.touch();

            let size = match &message {
                Message::Text(text) => text.len(),
                Message::Binary(bytes) | Message::Ping(bytes) | Message::Pong(bytes) => bytes.len(),
                Message::Close(frame) => {
                    debug!(frame = ?frame, "Client sent close frame");
                    self.signal.trigger(ExitReason::Failed(RelayError::SinkClosed(
                        "client sent close frame".into(),
                    )));
                    break;
                }
            };

            if size > limit {
                warn!(size, limit, "Client message exceeds size limit");
                self.signal.trigger(ExitReason::Failed(RelayError::BufferCapacityExceeded {
                    size,
                    limit,
                }));
                break;
            }

            if matches!(message, Message::Pong(_)) {
                trace!("Heartbeat acknowledged");
            }
        }
    }

    async fn close_sink<S, E>(&self, sink: &mut SinkConnection<S>)
    where
        S: Sink<Message, Error = E> + Unpin,
        E: std::fmt::Display,
    {
        match self.signal.reason() {
            Some(reason) if reason.sink_usable() => {
                // A runtime failure before any data reached the client gets explained once
                if let ExitReason::Failed(err) = reason {
                    if self.frames_sent() == 0 {
                        if let Err(e) = sink.send(diagnostic_frame(err)).await {
                            debug!(error = %e, "Diagnostic frame not delivered");
                        }
                    }
                }
                sink.close(reason.close_frame()).await;
            }
            _ => {
                sink.abandon();
            }
        }
    }

    fn finish(&self, started: Instant) -> SessionReport {
        self.state.send_replace(SessionState::Closed);

        let reason = self
            .signal
            .reason()
            .cloned()
            .unwrap_or(ExitReason::Cancelled);

        let report = SessionReport {
            session_id: self.session_id,
            container_id: self.container_id.clone(),
            reason,
            frames_sent: self.frames_sent(),
            bytes_forwarded: self.bytes_forwarded(),
            duration: started.elapsed(),
        };

        info!(
            reason = %report.reason,
            frames_sent = report.frames_sent,
            bytes_forwarded = report.bytes_forwarded,
            duration_ms = report.duration.as_millis() as u64,
            "Relay session closed"
        );

        report
    }
}

/// Text frame telling the client why its log stream could not be relayed.
fn diagnostic_frame(err: &RelayError) -> Message {
    Message::Text(format!("error: cannot get logs: {err}"))
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use futures::channel::mpsc as fmpsc;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::relay::testing::{FakeRuntime, RecordingSink};
    use crate::relay::HEARTBEAT_PAYLOAD;
    use crate::runtime::MockRuntimeApi;

    type Inbound = fmpsc::UnboundedReceiver<Result<Message, io::Error>>;
    type InboundTx = fmpsc::UnboundedSender<Result<Message, io::Error>>;

    fn inbound() -> (InboundTx, Inbound) {
        fmpsc::unbounded()
    }

    fn close_frame(code: u16, reason: &'static str) -> Message {
        Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }))
    }

    async fn wait_for_frames(session: &RelaySession, count: u64) {
        while session.frames_sent() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_two_lines_then_end_of_stream() {
        let mock = tokio_test::io::Builder::new()
            .read(b"log line 1\n")
            .read(b"log line 2\n")
            .build();
        let runtime = FakeRuntime::with_source(LogSource::new(mock));
        let sink = RecordingSink::new();
        let log = sink.log();
        let (_peer, inbound) = inbound();

        let session = RelaySession::new("web", RelayLimits::default());
        let report = session
            .run(
                &runtime,
                SinkConnection::new(sink, Duration::from_secs(10)),
                inbound,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.reason, ExitReason::EndOfStream);
        assert_eq!(
            log.frames(),
            vec![
                Message::Text("log line 1\n".into()),
                Message::Text("log line 2\n".into()),
                close_frame(close_code::NORMAL, "log stream ended"),
            ]
        );
        assert_eq!(log.closes(), 1);
        assert_eq!(report.frames_sent, 2);
        assert_eq!(report.bytes_forwarded, 22);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_bytes_arrive_in_order_across_uneven_reads() {
        let parts: [&[u8]; 5] = [b"ab", b"cdefgh", b"i", b"jklmnopqrstuvwxyz\n", b"0123456789"];
        let mut builder = tokio_test::io::Builder::new();
        for part in parts {
            builder.read(part);
        }
        let runtime = FakeRuntime::with_source(LogSource::new(builder.build()));
        let sink = RecordingSink::new();
        let log = sink.log();
        let (_peer, inbound) = inbound();

        let limits = RelayLimits {
            read_buffer_size: 5,
            channel_capacity: 2,
            ..RelayLimits::default()
        };
        let session = RelaySession::new("web", limits);
        let report = session
            .run(
                &runtime,
                SinkConnection::new(sink, Duration::from_secs(10)),
                inbound,
                &CancellationToken::new(),
            )
            .await;

        let expected: Vec<u8> = parts.concat();
        assert_eq!(report.reason, ExitReason::EndOfStream);
        assert_eq!(log.data(), expected);
        assert!(log
            .data_frames()
            .iter()
            .all(|f| matches!(f, Message::Text(t) if t.len() <= 5)));
        assert_eq!(report.bytes_forwarded, expected.len() as u64);
    }

    #[tokio::test]
    async fn test_open_failure_sends_one_diagnostic_frame() {
        let mut runtime = MockRuntimeApi::new();
        runtime
            .expect_open_log_stream()
            .times(1)
            .returning(|_| Err(RelayError::RuntimeUnavailable("connection refused".into())));

        let sink = RecordingSink::new();
        let log = sink.log();
        let (_peer, inbound) = inbound();

        let session = RelaySession::new("web", RelayLimits::default());
        let report = session
            .run(
                &runtime,
                SinkConnection::new(sink, Duration::from_secs(10)),
                inbound,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            report.reason,
            ExitReason::Failed(RelayError::RuntimeUnavailable("connection refused".into()))
        );
        assert_eq!(
            log.frames(),
            vec![
                Message::Text(
                    "error: cannot get logs: container runtime unavailable: connection refused"
                        .into()
                ),
                close_frame(close_code::ERROR, "log stream unavailable"),
            ]
        );
        assert_eq!(log.closes(), 1);
        assert_eq!(report.frames_sent, 0);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_cancel_while_read_is_blocked() {
        let (mut feed, reader) = tokio::io::duplex(64);
        let runtime = Arc::new(FakeRuntime::with_source(LogSource::new(reader)));
        let sink = RecordingSink::new();
        let log = sink.log();
        let (_peer, inbound) = inbound();

        let session = Arc::new(RelaySession::new("web", RelayLimits::default()));
        let mut states = session.subscribe();

        let task = {
            let session = session.clone();
            let runtime = runtime.clone();
            tokio::spawn(async move {
                session
                    .run(
                        runtime.as_ref(),
                        SinkConnection::new(sink, Duration::from_secs(10)),
                        inbound,
                        &CancellationToken::new(),
                    )
                    .await
            })
        };

        states
            .wait_for(|s| *s == SessionState::Streaming)
            .await
            .unwrap();
        assert!(session.cancel());

        let report = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("session did not close after cancel")
            .unwrap();

        assert_eq!(report.reason, ExitReason::Cancelled);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            log.frames(),
            vec![close_frame(close_code::AWAY, "relay cancelled")]
        );
        assert_eq!(log.closes(), 1);
        // The source was released: the producer side sees a broken pipe.
        assert!(feed.write_all(b"late line\n").await.is_err());
        // Further cancellation is a no-op.
        assert!(!session.cancel());
        assert_eq!(session.exit_reason(), Some(ExitReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_deadline_stops_all_sends() {
        let (mut feed, reader) = tokio::io::duplex(64);
        feed.write_all(b"log line 1\n").await.unwrap();
        let runtime = FakeRuntime::with_source(LogSource::new(reader));
        // Becomes writable after the deadline, so any later send would be recorded.
        let sink = RecordingSink::blocked_until(tokio::time::sleep(Duration::from_secs(15)));
        let log = sink.log();
        let (_peer, inbound) = inbound();

        let session = RelaySession::new("web", RelayLimits::default());
        let report = session
            .run(
                &runtime,
                SinkConnection::new(sink, Duration::from_secs(10)),
                inbound,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            report.reason,
            ExitReason::Failed(RelayError::SinkWriteTimeout(Duration::from_secs(10)))
        );
        assert!(report.duration < Duration::from_secs(15));
        assert!(log.frames().is_empty());
        assert_eq!(log.closes(), 0);
        assert_eq!(report.frames_sent, 0);
    }

    #[tokio::test]
    async fn test_end_of_stream_drains_buffered_chunks() {
        let mock = tokio_test::io::Builder::new()
            .read(b"log line 1\n")
            .read(b"log line 2\n")
            .build();
        let runtime = Arc::new(FakeRuntime::with_source(LogSource::new(mock)));
        let (open_gate, gate) = tokio::sync::oneshot::channel::<()>();
        let sink = RecordingSink::blocked_until(async {
            let _ = gate.await;
        });
        let log = sink.log();
        let (_peer, inbound) = inbound();

        let session = Arc::new(RelaySession::new("web", RelayLimits::default()));
        let mut states = session.subscribe();

        let task = {
            let session = session.clone();
            let runtime = runtime.clone();
            tokio::spawn(async move {
                session
                    .run(
                        runtime.as_ref(),
                        SinkConnection::new(sink, Duration::from_secs(10)),
                        inbound,
                        &CancellationToken::new(),
                    )
                    .await
            })
        };

        // The source is exhausted while the client still holds both lines.
        states
            .wait_for(|s| *s == SessionState::Draining)
            .await
            .unwrap();
        assert_eq!(session.exit_reason(), Some(ExitReason::EndOfStream));
        assert!(log.frames().is_empty());

        open_gate.send(()).unwrap();
        let report = task.await.unwrap();

        assert_eq!(report.reason, ExitReason::EndOfStream);
        assert_eq!(
            log.frames(),
            vec![
                Message::Text("log line 1\n".into()),
                Message::Text("log line 2\n".into()),
                close_frame(close_code::NORMAL, "log stream ended"),
            ]
        );
        assert_eq!(report.frames_sent, 2);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out_while_source_produces() {
        let (mut feed, reader) = tokio::io::duplex(1024);
        let producer = tokio::spawn(async move {
            loop {
                if feed.write_all(b"tick\n").await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });

        let runtime = FakeRuntime::with_source(LogSource::new(reader));
        let sink = RecordingSink::new();
        let log = sink.log();
        let (_peer, inbound) = inbound();

        let session = RelaySession::new("web", RelayLimits::default());
        let report = session
            .run(
                &runtime,
                SinkConnection::new(sink, Duration::from_secs(10)),
                inbound,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            report.reason,
            ExitReason::Failed(RelayError::PeerTimeout(Duration::from_secs(60)))
        );
        assert!(report.frames_sent >= 50);
        let frames = log.frames();
        assert!(frames.contains(&Message::Ping(HEARTBEAT_PAYLOAD.to_vec())));
        assert!(!frames.iter().any(|f| matches!(f, Message::Close(_))));
        assert_eq!(log.closes(), 0);

        producer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_acks_keep_session_alive() {
        let (mut feed, reader) = tokio::io::duplex(64);
        let runtime = FakeRuntime::with_source(LogSource::new(reader));
        let sink = RecordingSink::new();
        let (peer, inbound) = inbound();

        let acker = tokio::spawn(async move {
            for _ in 0..6 {
                tokio::time::sleep(Duration::from_secs(30)).await;
                peer.unbounded_send(Ok(Message::Pong(HEARTBEAT_PAYLOAD.to_vec())))
                    .unwrap();
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            feed.shutdown().await.unwrap();
            (peer, feed)
        });

        let session = RelaySession::new("web", RelayLimits::default());
        let report = session
            .run(
                &runtime,
                SinkConnection::new(sink, Duration::from_secs(10)),
                inbound,
                &CancellationToken::new(),
            )
            .await;

        // Three minutes of acknowledged heartbeats, then a clean end of stream.
        assert_eq!(report.reason, ExitReason::EndOfStream);
        let _ = acker.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_close_mid_stream() {
        let (mut feed, reader) = tokio::io::duplex(64);
        let runtime = Arc::new(FakeRuntime::with_source(LogSource::new(reader)));
        let sink = RecordingSink::new();
        let log = sink.log();
        let (peer, inbound) = inbound();

        let session = Arc::new(RelaySession::new("web", RelayLimits::default()));
        let task = {
            let session = session.clone();
            let runtime = runtime.clone();
            tokio::spawn(async move {
                session
                    .run(
                        runtime.as_ref(),
                        SinkConnection::new(sink, Duration::from_secs(10)),
                        inbound,
                        &CancellationToken::new(),
                    )
                    .await
            })
        };

        feed.write_all(b"first line\n").await.unwrap();
        wait_for_frames(&session, 1).await;

        peer.unbounded_send(Ok(close_frame(close_code::NORMAL, "bye")))
            .unwrap();
        let report = task.await.unwrap();

        assert_eq!(
            report.reason,
            ExitReason::Failed(RelayError::SinkClosed("client sent close frame".into()))
        );
        assert_eq!(log.frames(), vec![Message::Text("first line\n".into())]);
        assert_eq!(log.closes(), 0);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(feed.write_all(b"second line\n").await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_client_message_ends_session() {
        let (_feed, reader) = tokio::io::duplex(64);
        let runtime = FakeRuntime::with_source(LogSource::new(reader));
        let sink = RecordingSink::new();
        let log = sink.log();
        let (peer, inbound) = inbound();

        let limits = RelayLimits {
            max_message_bytes: 16,
            ..RelayLimits::default()
        };
        peer.unbounded_send(Ok(Message::Binary(vec![0; 17]))).unwrap();

        let session = RelaySession::new("web", limits);
        let report = session
            .run(
                &runtime,
                SinkConnection::new(sink, Duration::from_secs(10)),
                inbound,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            report.reason,
            ExitReason::Failed(RelayError::BufferCapacityExceeded { size: 17, limit: 16 })
        );
        assert!(log.frames().is_empty());
        drop(peer);
    }

    #[tokio::test]
    async fn test_source_failure_closes_with_error_code() {
        let mock = tokio_test::io::Builder::new()
            .read(b"partial\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "daemon restarted"))
            .build();
        let runtime = FakeRuntime::with_source(LogSource::new(mock));
        let sink = RecordingSink::new();
        let log = sink.log();
        let (_peer, inbound) = inbound();

        let session = RelaySession::new("web", RelayLimits::default());
        let report = session
            .run(
                &runtime,
                SinkConnection::new(sink, Duration::from_secs(10)),
                inbound,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            report.reason,
            ExitReason::Failed(RelayError::RuntimeUnavailable("daemon restarted".into()))
        );
        assert_eq!(
            log.frames(),
            vec![
                Message::Text("partial\n".into()),
                close_frame(close_code::ERROR, "log stream failed"),
            ]
        );
    }

    #[tokio::test]
    async fn test_first_read_failure_sends_one_diagnostic_frame() {
        let mock = tokio_test::io::Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "daemon restarted"))
            .build();
        let runtime = FakeRuntime::with_source(LogSource::new(mock));
        let sink = RecordingSink::new();
        let log = sink.log();
        let (_peer, inbound) = inbound();

        let session = RelaySession::new("web", RelayLimits::default());
        let report = session
            .run(
                &runtime,
                SinkConnection::new(sink, Duration::from_secs(10)),
                inbound,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            report.reason,
            ExitReason::Failed(RelayError::RuntimeUnavailable("daemon restarted".into()))
        );
        assert_eq!(
            log.frames(),
            vec![
                Message::Text(
                    "error: cannot get logs: container runtime unavailable: daemon restarted"
                        .into()
                ),
                close_frame(close_code::ERROR, "log stream failed"),
            ]
        );
        assert_eq!(log.closes(), 1);
        assert_eq!(report.frames_sent, 0);
    }

    #[tokio::test]
    async fn test_process_shutdown_closes_as_going_away() {
        let (_feed, reader) = tokio::io::duplex(64);
        let runtime = FakeRuntime::with_source(LogSource::new(reader));
        let sink = RecordingSink::new();
        let log = sink.log();
        let (_peer, inbound) = inbound();

        let shutdown = CancellationToken::new();
        let session = RelaySession::new("web", RelayLimits::default());
        let (report, _) = tokio::join!(
            session.run(
                &runtime,
                SinkConnection::new(sink, Duration::from_secs(10)),
                inbound,
                &shutdown,
            ),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                shutdown.cancel();
            }
        );

        assert_eq!(report.reason, ExitReason::Shutdown);
        assert_eq!(
            log.frames(),
            vec![close_frame(close_code::AWAY, "server shutting down")]
        );
    }
}
