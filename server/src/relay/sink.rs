//! Client-facing WebSocket connection

use std::future::Future;
use std::time::Duration;

use axum::{
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    http::{header, HeaderMap},
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use tracing::debug;

use super::error::RelayError;
use super::RelayLimits;

/// Payload of the application-level heartbeat ping.
pub const HEARTBEAT_PAYLOAD: &[u8] = b"dockweb-heartbeat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Open,
    Failed,
    Closed,
}

/// Framed outbound half of the client connection.
///
/// Owned by exactly one session and written by one task at a time. Every send
/// is bounded by the write deadline; after a failed send no further frames go
/// out.
pub struct SinkConnection<S> {
    inner: S,
    write_timeout: Duration,
    state: SinkState,
}

impl<S, E> SinkConnection<S>
where
    S: Sink<Message, Error = E> + Unpin,
    E: std::fmt::Display,
{
    pub fn new(inner: S, write_timeout: Duration) -> Self {
        Self {
            inner,
            write_timeout,
            state: SinkState::Open,
        }
    }

    pub async fn send(&mut self, frame: Message) -> Result<(), RelayError> {
        if self.state != SinkState::Open {
            return Err(RelayError::SinkClosed("connection no longer writable".into()));
        }

        let err = match tokio::time::timeout(self.write_timeout, self.inner.send(frame)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => RelayError::SinkClosed(e.to_string()),
            Err(_) => RelayError::SinkWriteTimeout(self.write_timeout),
        };
        self.state = SinkState::Failed;
        Err(err)
    }

    pub async fn send_heartbeat(&mut self) -> Result<(), RelayError> {
        self.send(Message::Ping(HEARTBEAT_PAYLOAD.to_vec())).await
    }

    /// Close gracefully: optional Close frame, then close the transport.
    ///
    /// Returns `false` if the connection was already closed. Falls back to
    /// [`abandon`](Self::abandon) when an earlier send failed.
    pub async fn close(&mut self, farewell: Option<CloseFrame<'static>>) -> bool {
        match self.state {
            SinkState::Closed => return false,
            SinkState::Failed => return self.abandon(),
            SinkState::Open => {}
        }

        if let Some(frame) = farewell {
            if let Err(e) = self.send(Message::Close(Some(frame))).await {
                debug!(error = %e, "Close frame not delivered");
                return self.abandon();
            }
        }

        if tokio::time::timeout(self.write_timeout, self.inner.close())
            .await
            .is_err()
        {
            debug!("Client connection close timed out");
        }
        self.state = SinkState::Closed;
        true
    }

    /// Release the connection without writing anything more to it.
    pub fn abandon(&mut self) -> bool {
        if self.state == SinkState::Closed {
            return false;
        }
        self.state = SinkState::Closed;
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state == SinkState::Closed
    }
}

/// Origin allow-list for WebSocket upgrades.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    /// Browsers always send `Origin`; a request without one comes from a
    /// non-browser client and is allowed.
    pub fn permits(&self, headers: &HeaderMap) -> bool {
        let Some(origin) = headers.get(header::ORIGIN) else {
            return true;
        };
        let Ok(origin) = origin.to_str() else {
            return false;
        };
        let origin = origin.trim_end_matches('/');
        self.allowed
            .iter()
            .any(|allowed| allowed == "*" || allowed.trim_end_matches('/') == origin)
    }
}

/// Builds sink connections for one request from explicit configuration.
#[derive(Debug, Clone)]
pub struct SinkFactory {
    origins: OriginPolicy,
    limits: RelayLimits,
}

impl SinkFactory {
    pub fn new(origins: OriginPolicy, limits: RelayLimits) -> Self {
        Self { origins, limits }
    }

    pub fn permits(&self, headers: &HeaderMap) -> bool {
        self.origins.permits(headers)
    }

    /// Complete the upgrade and hand the split socket to `handler`.
    pub fn upgrade<F, Fut>(&self, ws: WebSocketUpgrade, handler: F) -> Response
    where
        F: FnOnce(SinkConnection<SplitSink<WebSocket, Message>>, SplitStream<WebSocket>) -> Fut
            + Send
            + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let write_timeout = self.limits.write_timeout;
        ws.max_message_size(self.limits.max_message_bytes)
            .max_frame_size(self.limits.max_message_bytes)
            .on_upgrade(move |socket| {
                let (sender, receiver) = socket.split();
                handler(SinkConnection::new(sender, write_timeout), receiver)
            })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::relay::testing::RecordingSink;

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out_and_refuses_further_sends() {
        let sink = RecordingSink::stalled();
        let log = sink.log();
        let mut conn = SinkConnection::new(sink, Duration::from_secs(10));

        let err = conn.send(Message::Text("line\n".into())).await.unwrap_err();
        assert_eq!(err, RelayError::SinkWriteTimeout(Duration::from_secs(10)));

        let err = conn.send(Message::Text("again\n".into())).await.unwrap_err();
        assert!(matches!(err, RelayError::SinkClosed(_)));

        // Failed connections are released without any further I/O.
        assert!(conn.close(None).await);
        assert!(conn.is_closed());
        assert!(log.frames().is_empty());
        assert_eq!(log.closes(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let sink = RecordingSink::new();
        let log = sink.log();
        let mut conn = SinkConnection::new(sink, Duration::from_secs(10));

        conn.send_heartbeat().await.unwrap();
        assert!(conn.close(None).await);
        assert!(!conn.close(None).await);
        assert!(!conn.abandon());

        assert_eq!(log.frames(), vec![Message::Ping(HEARTBEAT_PAYLOAD.to_vec())]);
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn test_origin_policy() {
        let policy = OriginPolicy::new(vec!["http://localhost:3000".into()]);

        assert!(policy.permits(&HeaderMap::new()));

        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("http://localhost:3000"));
        assert!(policy.permits(&headers));

        headers.insert(header::ORIGIN, HeaderValue::from_static("http://evil.example"));
        assert!(!policy.permits(&headers));

        let any = OriginPolicy::new(vec!["*".into()]);
        assert!(any.permits(&headers));
    }
}
