//! Secure-dial abstraction for the second tunnel hop
//!
//! The tunnel core does not know how the bastion hop is established; it
//! talks to a [`SecureDialer`] that yields an authenticated [`SecureSession`]
//! from which byte streams to the final destination can be opened. The
//! production implementation lives in `duohop-transport-ssh`; tests use
//! in-memory mocks over [`tokio::io::duplex`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod endpoint;

pub use endpoint::{Endpoint, ParseEndpointError};

#[cfg(test)]
mod tests;

pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by a secure-dial implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The dialer was constructed without a usable credential. Deliberately
    /// raised at dial time, not at construction time: a missing key file
    /// must not prevent building a tunnel.
    #[error("no usable credential for public-key authentication")]
    MissingCredential,

    #[error("failed to open stream: {0}")]
    StreamOpenFailed(String),

    #[error("session is closed")]
    SessionClosed,

    #[error("close failed: {0}")]
    CloseFailed(String),
}

/// Dials an authenticated secure session to a bastion endpoint.
#[async_trait]
pub trait SecureDialer: Send + Sync + 'static {
    type Session: SecureSession;

    /// Establish and authenticate a session with `endpoint`. Implementations
    /// bound the attempt with their own connect timeout so a dial against an
    /// unresponsive host cannot stall the caller indefinitely.
    async fn dial(&self, endpoint: &Endpoint) -> TransportResult<Self::Session>;
}

/// An established secure session.
///
/// Handles are cheap to clone; all clones refer to the same underlying
/// session, so closing any of them closes the session for all.
#[async_trait]
pub trait SecureSession: Clone + Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a byte stream to `remote`, dialed from the session's far end.
    async fn open_stream(&self, remote: &Endpoint) -> TransportResult<Self::Stream>;

    /// Tear the session down.
    async fn close(&self) -> TransportResult<()>;
}
