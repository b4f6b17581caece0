//! Core domain types

use std::fmt;
use std::path::PathBuf;

/// Port used when a host entry leaves it unset
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A validated host to tail.
///
/// `host_tag` is the key of the host in the spec file and identifies the host
/// in every output prefix, log line and error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoint {
    pub host_tag: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub remote_file: String,
}

impl HostEndpoint {
    /// `hostname:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl fmt::Display for HostEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}@{}:{})",
            self.host_tag, self.username, self.hostname, self.port
        )
    }
}

/// How the server's host key is checked during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// The key must match an entry in this known_hosts file
    KnownHosts(PathBuf),
    /// Any host key is accepted
    SkipVerification,
}
