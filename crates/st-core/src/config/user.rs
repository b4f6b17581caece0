//! Per-user configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::expand_tilde;
use super::serde_utils::duration_secs;
use crate::types::HostKeyPolicy;

/// How remote host keys are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyCheck {
    /// Verify against the known_hosts file
    #[default]
    KnownHosts,
    /// Accept any host key
    Skip,
}

/// Settings read from `~/.config/sshtail/config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Key used for hosts without an entry in the spec's `keys` section
    pub default_key: Option<PathBuf>,

    /// Host key verification mode
    pub host_key_policy: HostKeyCheck,

    /// known_hosts file used when `host_key_policy` is `known-hosts`
    pub known_hosts_path: PathBuf,

    /// Timeout for dialing and handshaking with one host
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Capacity of the shared output channel
    pub channel_capacity: usize,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            default_key: None,
            host_key_policy: HostKeyCheck::KnownHosts,
            known_hosts_path: PathBuf::from("~/.ssh/known_hosts"),
            connect_timeout: Duration::from_secs(30),
            channel_capacity: 256,
        }
    }
}

impl UserConfig {
    /// Key path used when a host has no explicit key
    pub fn fallback_key(&self) -> PathBuf {
        self.default_key
            .clone()
            .unwrap_or_else(|| PathBuf::from("~/.ssh/id_rsa"))
    }

    /// Resolve the configured check into a concrete policy
    pub fn host_key_policy(&self) -> HostKeyPolicy {
        match self.host_key_policy {
            HostKeyCheck::KnownHosts => {
                HostKeyPolicy::KnownHosts(expand_tilde(&self.known_hosts_path))
            }
            HostKeyCheck::Skip => HostKeyPolicy::SkipVerification,
        }
    }
}
