//! Tunnel configuration

use duohop_transport::Endpoint;
use serde::{Deserialize, Serialize};

/// Addresses for the two hops.
///
/// `local` is bound and accepts exactly one connection, `proxy` is the
/// bastion reachable directly, and `remote` must be reachable from the
/// bastion's network. Built once at tunnel creation; never mutated. The
/// bastion username and credential travel with the secure-dial
/// implementation, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub local: Endpoint,
    pub proxy: Endpoint,
    pub remote: Endpoint,
}

impl TunnelConfig {
    pub fn new(local: Endpoint, proxy: Endpoint, remote: Endpoint) -> Self {
        Self {
            local,
            proxy,
            remote,
        }
    }

    pub fn builder() -> TunnelConfigBuilder {
        TunnelConfigBuilder::default()
    }
}

/// Builder for [`TunnelConfig`]
#[derive(Default)]
pub struct TunnelConfigBuilder {
    local: Option<Endpoint>,
    proxy: Option<Endpoint>,
    remote: Option<Endpoint>,
}

impl TunnelConfigBuilder {
    pub fn local(mut self, endpoint: Endpoint) -> Self {
        self.local = Some(endpoint);
        self
    }

    pub fn proxy(mut self, endpoint: Endpoint) -> Self {
        self.proxy = Some(endpoint);
        self
    }

    pub fn remote(mut self, endpoint: Endpoint) -> Self {
        self.remote = Some(endpoint);
        self
    }

    pub fn build(self) -> Result<TunnelConfig, String> {
        Ok(TunnelConfig {
            local: self.local.ok_or("local endpoint is required")?,
            proxy: self.proxy.ok_or("proxy endpoint is required")?,
            remote: self.remote.ok_or("remote endpoint is required")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_all_three_endpoints() {
        let err = TunnelConfig::builder()
            .local(Endpoint::new("127.0.0.1", 4000))
            .remote(Endpoint::new("db.internal", 5432))
            .build()
            .unwrap_err();
        assert_eq!(err, "proxy endpoint is required");
    }

    #[test]
    fn builder_produces_complete_config() {
        let config = TunnelConfig::builder()
            .local(Endpoint::new("127.0.0.1", 4000))
            .proxy(Endpoint::new("bastion", 22))
            .remote(Endpoint::new("db.internal", 5432))
            .build()
            .unwrap();
        assert_eq!(config.local.port, 4000);
        assert_eq!(config.proxy.to_string(), "bastion:22");
        assert_eq!(config.remote.host, "db.internal");
    }
}
