//! Bounded handoff between the read loop and the write loop

use axum::extract::ws::Message;
use tokio::sync::mpsc;

/// Bytes from one source read, copied out of the reusable read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayChunk(Vec<u8>);

impl RelayChunk {
    pub fn copy_from(buf: &[u8]) -> Self {
        Self(buf.to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// One chunk is one frame: text when the bytes are valid UTF-8, binary otherwise.
    pub fn into_frame(self) -> Message {
        match String::from_utf8(self.0) {
            Ok(text) => Message::Text(text),
            Err(err) => Message::Binary(err.into_bytes()),
        }
    }
}

/// Create the relay channel. Capacity is clamped to at least one chunk.
pub fn relay_channel(capacity: usize) -> (mpsc::Sender<RelayChunk>, mpsc::Receiver<RelayChunk>) {
    mpsc::channel(capacity.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_does_not_alias_read_buffer() {
        let mut buf = *b"log line 1\n";
        let chunk = RelayChunk::copy_from(&buf[..4]);
        buf[0] = b'X';
        assert_eq!(chunk.as_bytes(), b"log ");
        assert_eq!(chunk.len(), 4);
    }

    #[test]
    fn test_frame_kind_follows_utf8_validity() {
        match RelayChunk::copy_from(b"hello\n").into_frame() {
            Message::Text(text) => assert_eq!(text, "hello\n"),
            other => panic!("expected text frame, got {other:?}"),
        }
        // A multi-byte sequence cut in half by the read buffer boundary.
        match RelayChunk::copy_from(&[0x68, 0xC3]).into_frame() {
            Message::Binary(bytes) => assert_eq!(bytes, vec![0x68, 0xC3]),
            other => panic!("expected binary frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_channel_applies_backpressure() {
        let (tx, mut rx) = relay_channel(0);
        tx.send(RelayChunk::copy_from(b"a")).await.unwrap();
        assert!(tx.try_send(RelayChunk::copy_from(b"b")).is_err());
        assert_eq!(rx.recv().await.unwrap().as_bytes(), b"a");
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
