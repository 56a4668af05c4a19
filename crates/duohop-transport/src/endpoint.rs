//! Network endpoint descriptor

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An immutable `host:port` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid endpoint {0:?}, expected host:port")]
pub struct ParseEndpointError(String);

impl FromStr for Endpoint {
    type Err = ParseEndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseEndpointError(s.to_string()))?;
        if host.is_empty() {
            return Err(ParseEndpointError(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ParseEndpointError(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_as_host_colon_port() {
        let endpoint = Endpoint::new("db.internal", 5432);
        assert_eq!(endpoint.to_string(), "db.internal:5432");
    }

    #[test]
    fn parses_host_colon_port() {
        let endpoint: Endpoint = "bastion.example.com:22".parse().unwrap();
        assert_eq!(endpoint, Endpoint::new("bastion.example.com", 22));
    }

    #[test]
    fn display_and_parse_round_trip() {
        let endpoint = Endpoint::new("127.0.0.1", 4000);
        let parsed: Endpoint = endpoint.to_string().parse().unwrap();
        assert_eq!(parsed, endpoint);
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!("no-port".parse::<Endpoint>().is_err());
        assert!(":22".parse::<Endpoint>().is_err());
        assert!("host:notaport".parse::<Endpoint>().is_err());
        assert!("host:99999".parse::<Endpoint>().is_err());
    }
}
