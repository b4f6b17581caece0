//! Spec files
//!
//! A spec file is a YAML document naming the hosts to connect to, the file to
//! tail on each, and optionally the private key to use per host:
//!
//! ```yaml
//! hosts:
//!   web1:
//!     hostname: web1.internal
//!     file: /var/log/nginx/access.log
//! keys:
//!   web1:
//!     path: ~/.ssh/id_ed25519
//! ```

mod template;

pub use template::{spec_template, TemplateOptions, SPEC_SUFFIX};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::SpecError;
use crate::types::{HostEndpoint, DEFAULT_SSH_PORT};

/// One entry of the `hosts` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    #[serde(default)]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub port: u16,
}

/// One entry of the `keys` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub path: PathBuf,
}

/// Parsed contents of a spec file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecFile {
    #[serde(default)]
    pub hosts: BTreeMap<String, HostSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<BTreeMap<String, KeySpec>>,
}

impl HostSpec {
    /// Validate this entry and fill in defaults for username and port.
    pub fn validate(&self, host_tag: &str) -> Result<HostEndpoint, SpecError> {
        let invalid = |reason: &str| SpecError::InvalidHost {
            host_tag: host_tag.to_string(),
            reason: reason.to_string(),
        };

        if self.hostname.trim().is_empty() {
            return Err(invalid("no hostname specified"));
        }
        if self.file.trim().is_empty() {
            return Err(invalid("no file to tail specified"));
        }

        let username = match self.username.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => whoami::username(),
        };
        let port = if self.port == 0 {
            DEFAULT_SSH_PORT
        } else {
            self.port
        };

        Ok(HostEndpoint {
            host_tag: host_tag.to_string(),
            hostname: self.hostname.trim().to_string(),
            port,
            username,
            remote_file: self.file.trim().to_string(),
        })
    }
}

impl SpecFile {
    /// Read and parse a spec file from disk
    pub fn read(path: &Path) -> Result<Self, SpecError> {
        tracing::debug!("Reading spec file {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse spec file contents
    pub fn from_yaml(content: &str) -> Result<Self, SpecError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validate every host, returning endpoints ordered by host tag
    pub fn validate(&self) -> Result<Vec<HostEndpoint>, SpecError> {
        if self.hosts.is_empty() {
            return Err(SpecError::NoHosts);
        }

        self.hosts
            .iter()
            .map(|(tag, host)| host.validate(tag))
            .collect()
    }

    /// Key path for a host: its `keys` entry, otherwise `fallback`
    pub fn key_path(&self, host_tag: &str, fallback: &Path) -> PathBuf {
        self.keys
            .as_ref()
            .and_then(|keys| keys.get(host_tag))
            .map(|key| key.path.clone())
            .unwrap_or_else(|| fallback.to_path_buf())
    }
}
