//! Test doubles for the relay

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::Sink;

use crate::relay::RelayError;
use crate::runtime::{LogSource, RuntimeApi, RuntimeInfo};

#[derive(Debug, Default)]
struct Recorded {
    frames: Vec<Message>,
    closes: usize,
}

/// Shared view of what a [`RecordingSink`] received.
#[derive(Debug, Clone, Default)]
pub struct SinkLog(Arc<Mutex<Recorded>>);

impl SinkLog {
    pub fn frames(&self) -> Vec<Message> {
        self.0.lock().unwrap().frames.clone()
    }

    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }

    /// Payload bytes of every text/binary frame, in order.
    pub fn data(&self) -> Vec<u8> {
        self.frames()
            .into_iter()
            .flat_map(|frame| match frame {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(bytes) => bytes,
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn data_frames(&self) -> Vec<Message> {
        self.frames()
            .into_iter()
            .filter(|f| matches!(f, Message::Text(_) | Message::Binary(_)))
            .collect()
    }
}

/// Sink that records frames. A blocked sink stays unready until its
/// blocker completes and records normally afterwards.
pub struct RecordingSink {
    log: SinkLog,
    blocker: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            log: SinkLog::default(),
            blocker: None,
        }
    }

    /// Never becomes ready.
    pub fn stalled() -> Self {
        Self::blocked_until(futures::future::pending())
    }

    pub fn blocked_until<F>(unblock: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            log: SinkLog::default(),
            blocker: Some(Box::pin(unblock)),
        }
    }

    pub fn log(&self) -> SinkLog {
        self.log.clone()
    }
}

impl Sink<Message> for RecordingSink {
    type Error = io::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        if let Some(blocker) = this.blocker.as_mut() {
            ready!(blocker.as_mut().poll(cx));
            this.blocker = None;
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.log.0.lock().unwrap().frames.push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.log.0.lock().unwrap().closes += 1;
        Poll::Ready(Ok(()))
    }
}

/// Runtime that hands out one prepared source.
pub struct FakeRuntime {
    source: Mutex<Option<LogSource>>,
}

impl FakeRuntime {
    pub fn with_source(source: LogSource) -> Self {
        Self {
            source: Mutex::new(Some(source)),
        }
    }
}

#[async_trait]
impl RuntimeApi for FakeRuntime {
    async fn ping(&self) -> Result<RuntimeInfo, RelayError> {
        Ok(RuntimeInfo::default())
    }

    async fn inspect_target(&self, _container_id: &str) -> Result<(), RelayError> {
        Ok(())
    }

    async fn open_log_stream(&self, container_id: &str) -> Result<LogSource, RelayError> {
        self.source
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| RelayError::TargetNotFound(container_id.to_string()))
    }
}
