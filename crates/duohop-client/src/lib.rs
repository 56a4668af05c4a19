//! Double-hop tunnel core
//!
//! A [`Tunnel`] binds a local endpoint, accepts a single inbound connection
//! and relays its bytes to a remote service that is only reachable through a
//! bastion host, using a [`duohop_transport::SecureDialer`] session for the
//! second hop.
//!
//! # Quick start
//!
//! ```ignore
//! use duohop_client::{Tunnel, TunnelConfig};
//! use duohop_transport::Endpoint;
//! use duohop_transport_ssh::{load_key_file, SshConfig, SshDialer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TunnelConfig::builder()
//!     .local(Endpoint::new("127.0.0.1", 4000))
//!     .proxy(Endpoint::new("bastion.example.com", 22))
//!     .remote(Endpoint::new("db.internal", 5432))
//!     .build()?;
//!
//! let dialer = SshDialer::new(SshConfig::new("ec2-user", load_key_file("key.pem")));
//! let tunnel = Tunnel::new(config, dialer);
//!
//! let handle = tunnel.clone();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.stop();
//! });
//!
//! // Resolves once the tunnel has fully closed.
//! tunnel.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod forward;
pub mod tunnel;

pub use config::{TunnelConfig, TunnelConfigBuilder};
pub use error::TunnelError;
pub use forward::Forwarder;
pub use tunnel::{Tunnel, TunnelState};
