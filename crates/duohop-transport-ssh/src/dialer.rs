//! SSH dialer and session

use std::sync::Arc;

use async_trait::async_trait;
use duohop_transport::{Endpoint, SecureDialer, SecureSession, TransportError, TransportResult};
use russh::client::{self, AuthResult, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use russh::{ChannelStream, Disconnect};
use tokio::time::timeout;
use tracing::debug;

use crate::SshConfig;

/// Accepts any host key. The bastion is pre-trusted in this deployment
/// model; known-hosts verification is out of scope.
struct AcceptingHandler;

impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Dials the bastion over SSH with public-key authentication.
pub struct SshDialer {
    config: SshConfig,
}

impl SshDialer {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SecureDialer for SshDialer {
    type Session = SshSession;

    async fn dial(&self, endpoint: &Endpoint) -> TransportResult<SshSession> {
        let key = self
            .config
            .key
            .clone()
            .ok_or(TransportError::MissingCredential)?;

        let addr = endpoint.to_string();
        let client_config = Arc::new(client::Config::default());

        let mut handle = match timeout(
            self.config.connect_timeout,
            client::connect(client_config, addr.as_str(), AcceptingHandler),
        )
        .await
        {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                return Err(TransportError::ConnectionFailed(format!("{addr}: {e}")));
            }
            Err(_) => return Err(TransportError::Timeout(self.config.connect_timeout)),
        };

        let rsa_hash = handle
            .best_supported_rsa_hash()
            .await
            .map_err(|e| TransportError::AuthenticationFailed(e.to_string()))?
            .flatten();
        let key = PrivateKeyWithHashAlg::new(key, rsa_hash);

        match handle
            .authenticate_publickey(self.config.user.as_str(), key)
            .await
        {
            Ok(AuthResult::Success) => {}
            Ok(AuthResult::Failure {
                remaining_methods, ..
            }) => {
                return Err(TransportError::AuthenticationFailed(format!(
                    "public key rejected for {}, server offers {:?}",
                    self.config.user, remaining_methods
                )));
            }
            Err(e) => return Err(TransportError::AuthenticationFailed(e.to_string())),
        }

        debug!("ssh session established with {}", addr);
        Ok(SshSession {
            handle: Arc::new(handle),
        })
    }
}

/// An authenticated SSH session with the bastion. Clones share the
/// underlying session.
#[derive(Clone)]
pub struct SshSession {
    handle: Arc<Handle<AcceptingHandler>>,
}

#[async_trait]
impl SecureSession for SshSession {
    type Stream = ChannelStream<client::Msg>;

    async fn open_stream(&self, remote: &Endpoint) -> TransportResult<Self::Stream> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(&remote.host, u32::from(remote.port), "127.0.0.1", 0)
            .await
            .map_err(|e| TransportError::StreamOpenFailed(format!("{remote}: {e}")))?;
        debug!("direct-tcpip channel open to {}", remote);
        Ok(channel.into_stream())
    }

    async fn close(&self) -> TransportResult<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "tunnel shutdown", "en")
            .await
            .map_err(|e| TransportError::CloseFailed(e.to_string()))
    }
}
