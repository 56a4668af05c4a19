//! Private-key credential loading

use std::path::Path;
use std::sync::Arc;

use russh::keys::{load_secret_key, PrivateKey};
use tracing::warn;

/// Load a private key for public-key authentication.
///
/// A missing or unparseable key file yields `None` rather than an error, so
/// a tunnel can still be constructed; the missing credential surfaces later,
/// at the proxy dial.
pub fn load_key_file(path: impl AsRef<Path>) -> Option<Arc<PrivateKey>> {
    let path = path.as_ref();
    match load_secret_key(path, None) {
        Ok(key) => Some(Arc::new(key)),
        Err(e) => {
            warn!("unable to load key file {}: {}", path.display(), e);
            None
        }
    }
}
