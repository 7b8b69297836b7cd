//! Sequential log byte source

use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Handle to a runtime log byte stream.
///
/// `read` is cancel-safe: a read abandoned mid-flight loses no bytes it has
/// not returned. `close` is idempotent and safe after a failed read.
pub struct LogSource {
    reader: Option<Pin<Box<dyn AsyncRead + Send>>>,
}

impl LogSource {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            reader: Some(Box::pin(reader)),
        }
    }

    /// Read the next bytes into `buf`. `Ok(0)` means end of stream, as does
    /// any read after `close`.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf).await,
            None => Ok(0),
        }
    }

    /// Release the underlying stream. Returns `true` on the releasing call.
    pub fn close(&mut self) -> bool {
        self.reader.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

impl std::fmt::Debug for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSource")
            .field("closed", &self.is_closed())
            .finish()
    }
}
