//! Tunnel error taxonomy

use thiserror::Error;

/// Terminal failures of a tunnel instance.
///
/// Copy-phase and close-phase errors are deliberately absent: stream resets
/// while forwarding and close failures during shutdown are logged, never
/// recorded as terminal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunnelError {
    /// Local bind failed; the tunnel never reached `Listening`.
    #[error("failed to listen on {endpoint}: {reason}")]
    Listen { endpoint: String, reason: String },

    /// Accepting the single local connection failed.
    #[error("failed to accept local connection: {0}")]
    Accept(String),

    /// First-hop dial or authentication with the bastion failed.
    #[error("proxy dial to {endpoint} failed: {reason}")]
    ProxyDial { endpoint: String, reason: String },

    /// Second-hop dial through the established session failed.
    #[error("remote dial to {endpoint} failed: {reason}")]
    RemoteDial { endpoint: String, reason: String },

    /// `start()` was called more than once on the same instance.
    #[error("tunnel already started")]
    AlreadyStarted,
}
