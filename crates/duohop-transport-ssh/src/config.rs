//! Bastion hop settings

use std::sync::Arc;
use std::time::Duration;

use russh::keys::PrivateKey;

/// Bound on TCP connect plus SSH handshake, separate from any per-channel
/// traffic timeout. Matches the classic 3-second client-config timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Settings for dialing the bastion.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Username presented to the bastion.
    pub user: String,
    /// Credential for public-key authentication. `None` is tolerated here;
    /// the dial then fails with `MissingCredential` instead of the
    /// construction failing.
    pub key: Option<Arc<PrivateKey>>,
    pub connect_timeout: Duration,
}

impl SshConfig {
    pub fn new(user: impl Into<String>, key: Option<Arc<PrivateKey>>) -> Self {
        Self {
            user: user.into(),
            key,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_three_second_connect_timeout() {
        let config = SshConfig::new("ec2-user", None);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert!(config.key.is_none());
    }

    #[test]
    fn connect_timeout_is_overridable() {
        let config =
            SshConfig::new("ec2-user", None).with_connect_timeout(Duration::from_millis(500));
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
    }
}
