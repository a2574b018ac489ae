//! Physical connection handles
//!
//! - [`Connection`] — async write/close abstraction an entity owns exclusively
//! - [`StreamConnection`] — connection over any `AsyncWrite` half
//! - [`MockConnection`] — in-memory connection for testing

use crate::error::{LinkError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Write half of one physical transport stream
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Write bytes as-is
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Shut the stream down; later writes fail
    async fn close(&self) -> Result<()>;

    /// Peer address, for diagnostics
    fn remote_addr(&self) -> String;
}

/// Connection over any `AsyncWrite` stream half
///
/// The writer is dropped on close, so the stream is shut down at most once.
pub struct StreamConnection<W> {
    inner: Mutex<Option<W>>,
    remote_addr: String,
}

impl<W> StreamConnection<W> {
    pub fn new(inner: W, remote_addr: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Some(inner)),
            remote_addr: remote_addr.into(),
        }
    }
}

impl<W> fmt::Debug for StreamConnection<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

#[async_trait]
impl<W> Connection for StreamConnection<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    async fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| LinkError::ConnectionWrite("connection closed".to_string()))?;
        writer
            .write_all(data)
            .await
            .map_err(|e| LinkError::ConnectionWrite(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| LinkError::ConnectionWrite(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let writer = self.inner.lock().await.take();
        match writer {
            Some(mut writer) => writer
                .shutdown()
                .await
                .map_err(|e| LinkError::ConnectionWrite(e.to_string())),
            None => Ok(()),
        }
    }

    fn remote_addr(&self) -> String {
        self.remote_addr.clone()
    }
}

/// In-memory connection for testing
///
/// Records every write and close call; can be told to fail either.
#[derive(Debug, Default)]
pub struct MockConnection {
    written: std::sync::Mutex<Vec<Vec<u8>>>,
    closes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_close: AtomicBool,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make close report an error (it is still counted)
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Everything written so far, one entry per write
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    /// Number of close calls
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn write(&self, data: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LinkError::ConnectionWrite("mock write failure".to_string()));
        }
        if let Ok(mut written) = self.written.lock() {
            written.push(data.to_vec());
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(LinkError::ConnectionWrite("mock close failure".to_string()));
        }
        Ok(())
    }

    fn remote_addr(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_stream_connection_write_and_close() {
        let (client, mut server) = tokio::io::duplex(1024);
        let conn = StreamConnection::new(client, "127.0.0.1:3250");

        conn.write(b"hello").await.unwrap();
        conn.close().await.unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello");
        assert_eq!(conn.remote_addr(), "127.0.0.1:3250");
    }

    #[tokio::test]
    async fn test_stream_connection_write_after_close() {
        let (client, _server) = tokio::io::duplex(64);
        let conn = StreamConnection::new(client, "peer");
        conn.close().await.unwrap();

        let err = conn.write(b"late").await.unwrap_err();
        assert!(matches!(err, LinkError::ConnectionWrite(_)));
        // Second close is a no-op
        assert!(conn.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_connection_records() {
        let conn = MockConnection::new();
        conn.write(b"a").await.unwrap();
        conn.write(b"bc").await.unwrap();
        assert_eq!(conn.written(), vec![b"a".to_vec(), b"bc".to_vec()]);

        conn.fail_writes(true);
        assert!(conn.write(b"d").await.is_err());
        assert_eq!(conn.written().len(), 2);

        conn.fail_close(true);
        assert!(conn.close().await.is_err());
        assert_eq!(conn.close_count(), 1);
    }
}
