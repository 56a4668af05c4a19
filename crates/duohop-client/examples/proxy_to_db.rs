//! Reach a database in a private network through a bastion host, then point
//! a database client at the local endpoint.
//!
//! Run with real addresses and a key that the bastion accepts:
//!
//! ```text
//! cargo run --example proxy_to_db
//! ```

use std::time::Duration;

use duohop_client::{Tunnel, TunnelConfig};
use duohop_transport::Endpoint;
use duohop_transport_ssh::{load_key_file, SshConfig, SshDialer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let config = TunnelConfig::builder()
        .local(Endpoint::new("localhost", 4000))
        .proxy(Endpoint::new("ec2.address.url", 22))
        .remote(Endpoint::new("rds.address.url", 1433))
        .build()?;

    let dialer = SshDialer::new(SshConfig::new("ec2-user", load_key_file("keyfile.pem")));
    let tunnel = Tunnel::new(config, dialer);

    let runner = tunnel.clone();
    let task = tokio::spawn(async move { runner.start().await });

    // A real application would hand localhost:4000 to its database client
    // here and run queries over the tunnel.
    tokio::time::sleep(Duration::from_secs(1)).await;

    tunnel.stop();
    task.await??;
    Ok(())
}
