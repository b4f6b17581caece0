//! Private key loading

use std::fmt;
use std::path::Path;

use russh_keys::key::KeyPair;

use st_core::config::expand_tilde;
use st_core::error::KeyError;

/// Asks the operator for the passphrase of an encrypted key
pub trait PassphrasePrompt: Send + Sync {
    fn passphrase(&self, host_tag: &str, path: &Path) -> Result<String, String>;
}

/// Prompt for non-interactive use; encrypted keys fail to load
pub struct NoPrompt;

impl PassphrasePrompt for NoPrompt {
    fn passphrase(&self, _host_tag: &str, path: &Path) -> Result<String, String> {
        Err(format!(
            "key {} requires a passphrase and no prompt is available",
            path.display()
        ))
    }
}

/// A decrypted private key for one host.
///
/// Consumed by value when a connection is established, so the key material
/// is dropped as soon as authentication is over.
pub struct Credential {
    host_tag: String,
    key: KeyPair,
}

impl Credential {
    pub fn new(host_tag: impl Into<String>, key: KeyPair) -> Self {
        Self {
            host_tag: host_tag.into(),
            key,
        }
    }

    pub fn host_tag(&self) -> &str {
        &self.host_tag
    }

    pub(crate) fn into_key(self) -> KeyPair {
        self.key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("host_tag", &self.host_tag)
            .finish_non_exhaustive()
    }
}

/// Load the private key at `path` for `host_tag`, asking `prompt` for a
/// passphrase when the key is encrypted.
pub fn load_credential(
    host_tag: &str,
    path: &Path,
    prompt: &dyn PassphrasePrompt,
) -> Result<Credential, KeyError> {
    let path = expand_tilde(path);
    if !path.exists() {
        return Err(KeyError::NotFound {
            host_tag: host_tag.to_string(),
            path,
        });
    }

    tracing::debug!("[{}] loading private key from {:?}", host_tag, path);

    let key = match russh_keys::load_secret_key(&path, None) {
        Ok(key) => key,
        Err(russh_keys::Error::KeyIsEncrypted) => {
            tracing::info!("[{}] key {:?} requires a passphrase", host_tag, path);
            let passphrase = prompt
                .passphrase(host_tag, &path)
                .map_err(|reason| KeyError::Prompt {
                    host_tag: host_tag.to_string(),
                    reason,
                })?;
            let key = russh_keys::load_secret_key(&path, Some(&passphrase)).map_err(|e| {
                tracing::debug!("[{}] decrypting {:?} failed: {}", host_tag, path, e);
                KeyError::Decrypt {
                    host_tag: host_tag.to_string(),
                    path: path.clone(),
                }
            })?;
            drop(passphrase);
            tracing::info!("[{}] key decrypted", host_tag);
            key
        }
        Err(e) => {
            return Err(KeyError::Load {
                host_tag: host_tag.to_string(),
                path,
                reason: e.to_string(),
            })
        }
    };

    Ok(Credential::new(host_tag, key))
}
