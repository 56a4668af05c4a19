//! Tests for the secure-dial abstraction

use super::*;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

/// Mock session backed by in-memory duplex pipes. The far end of every
/// opened stream is handed to the test through a channel.
#[derive(Clone, Debug)]
pub struct MockSession {
    far_ends: mpsc::UnboundedSender<DuplexStream>,
    closed: Arc<AtomicBool>,
    close_count: Arc<AtomicUsize>,
}

impl MockSession {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (far_ends, rx) = mpsc::unbounded_channel();
        let session = Self {
            far_ends,
            closed: Arc::new(AtomicBool::new(false)),
            close_count: Arc::new(AtomicUsize::new(0)),
        };
        (session, rx)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecureSession for MockSession {
    type Stream = DuplexStream;

    async fn open_stream(&self, _remote: &Endpoint) -> TransportResult<DuplexStream> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::SessionClosed);
        }
        let (near, far) = tokio::io::duplex(4096);
        let _ = self.far_ends.send(far);
        Ok(near)
    }

    async fn close(&self) -> TransportResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::SessionClosed);
        }
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock dialer that either hands out a prepared session or refuses.
pub struct MockDialer {
    session: Option<MockSession>,
}

impl MockDialer {
    pub fn succeeding(session: MockSession) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn refusing() -> Self {
        Self { session: None }
    }
}

#[async_trait]
impl SecureDialer for MockDialer {
    type Session = MockSession;

    async fn dial(&self, endpoint: &Endpoint) -> TransportResult<MockSession> {
        match &self.session {
            Some(session) => Ok(session.clone()),
            None => Err(TransportError::ConnectionFailed(format!(
                "{endpoint}: connection refused"
            ))),
        }
    }
}

#[tokio::test]
async fn mock_streams_carry_bytes_both_ways() {
    let (session, mut far_ends) = MockSession::new();
    let dialer = MockDialer::succeeding(session);

    let session = dialer
        .dial(&Endpoint::new("bastion", 22))
        .await
        .expect("dial should succeed");
    let mut near = session
        .open_stream(&Endpoint::new("db.internal", 5432))
        .await
        .expect("open_stream should succeed");
    let mut far = far_ends.recv().await.expect("far end should be delivered");

    near.write_all(b"PING").await.unwrap();
    let mut buf = [0u8; 4];
    far.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"PING");

    far.write_all(b"PONG").await.unwrap();
    near.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"PONG");
}

#[tokio::test]
async fn refusing_dialer_reports_connection_failed() {
    let dialer = MockDialer::refusing();
    let err = dialer
        .dial(&Endpoint::new("bastion", 22))
        .await
        .expect_err("dial should fail");
    assert!(matches!(err, TransportError::ConnectionFailed(_)));
}

#[tokio::test]
async fn closed_session_rejects_further_use() {
    let (session, _far_ends) = MockSession::new();

    session.close().await.expect("first close should succeed");
    assert_eq!(session.close_count(), 1);

    // Closing any clone closes the session for all of them.
    let clone = session.clone();
    assert!(matches!(
        clone.close().await,
        Err(TransportError::SessionClosed)
    ));
    assert!(matches!(
        clone.open_stream(&Endpoint::new("db", 1)).await,
        Err(TransportError::SessionClosed)
    ));
    assert_eq!(session.close_count(), 1);
}
