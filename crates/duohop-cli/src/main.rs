//! duohop - forward a local port to a remote service through a bastion host

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use duohop_client::{Tunnel, TunnelConfig};
use duohop_transport::Endpoint;
use duohop_transport_ssh::{load_key_file, SshConfig, SshDialer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Forward a local port to a remote service through a bastion host
#[derive(Parser, Debug)]
#[command(name = "duohop")]
#[command(about = "Secure double-hop TCP forwarding over SSH", long_about = None)]
struct Cli {
    /// Local endpoint to bind (host:port)
    #[arg(short, long, default_value = "127.0.0.1:4000")]
    local: String,

    /// Bastion endpoint (host:port)
    #[arg(short, long)]
    proxy: String,

    /// Username presented to the bastion
    #[arg(short, long, env = "DUOHOP_PROXY_USER")]
    user: String,

    /// Path to the private-key credential
    #[arg(short, long, env = "DUOHOP_KEY_FILE")]
    key: String,

    /// Remote endpoint reachable from the bastion's network (host:port)
    #[arg(short, long)]
    remote: String,

    /// Bound on the bastion connect + handshake, in seconds
    #[arg(long, default_value = "3")]
    connect_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let local: Endpoint = cli.local.parse().context("invalid --local endpoint")?;
    let proxy: Endpoint = cli.proxy.parse().context("invalid --proxy endpoint")?;
    let remote: Endpoint = cli.remote.parse().context("invalid --remote endpoint")?;

    let key = load_key_file(&cli.key);
    if key.is_none() {
        warn!(
            "no usable credential at {}; the proxy dial will fail",
            cli.key
        );
    }

    let ssh_config = SshConfig::new(cli.user, key)
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout));

    let config = TunnelConfig::builder()
        .local(local)
        .proxy(proxy)
        .remote(remote)
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;

    let tunnel = Tunnel::new(config, SshDialer::new(ssh_config));

    let handle = tunnel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping tunnel");
            handle.stop();
        }
    });

    tunnel.start().await?;
    Ok(())
}
