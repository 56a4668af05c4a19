//! SSH implementation of the secure-dial seam, built on russh
//!
//! Provides [`SshDialer`], which establishes an authenticated SSH session
//! with the bastion, and [`SshSession`], which opens `direct-tcpip` channels
//! to the final destination. Key material is loaded through
//! [`load_key_file`].

mod auth;
mod config;
mod dialer;

pub use auth::load_key_file;
pub use config::{SshConfig, DEFAULT_CONNECT_TIMEOUT};
pub use dialer::{SshDialer, SshSession};
