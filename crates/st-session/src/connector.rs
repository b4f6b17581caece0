//! Outbound SSH connections
//!
//! Dials one host, verifies its identity according to the configured
//! [`HostKeyPolicy`] and authenticates with a [`Credential`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use thiserror::Error;

use st_core::config::UserConfig;
use st_core::error::{ConnectionError, TailError, TransportError};
use st_core::spec::SpecFile;
use st_core::traits::{ChannelEvent, ClientConnection, TailChannel, TailConnection};
use st_core::{HostEndpoint, HostKeyPolicy};

use crate::credential::{load_credential, Credential, PassphrasePrompt};

/// Settings applied to every connection attempt
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// How the server's host key is checked
    pub host_key_policy: HostKeyPolicy,
    /// Upper bound on dial plus handshake
    pub connect_timeout: Duration,
}

impl ConnectOptions {
    pub fn from_config(config: &UserConfig) -> Self {
        Self {
            host_key_policy: config.host_key_policy(),
            connect_timeout: config.connect_timeout,
        }
    }
}

/// Open an authenticated connection to `endpoint`.
///
/// The credential is consumed; its key material is dropped once
/// authentication has finished, whatever the outcome.
pub async fn establish(
    endpoint: &HostEndpoint,
    credential: Credential,
    options: &ConnectOptions,
) -> Result<ClientConnection<SshConnection>, ConnectionError> {
    let address = endpoint.address();
    let dial_error = |reason: String| ConnectionError::Dial {
        host_tag: endpoint.host_tag.clone(),
        address: endpoint.address(),
        reason,
    };

    let handler = ClientHandler {
        host_tag: endpoint.host_tag.clone(),
        hostname: endpoint.hostname.clone(),
        port: endpoint.port,
        policy: options.host_key_policy.clone(),
    };

    tracing::debug!("[{}] connecting to {}", endpoint.host_tag, address);
    let connect = client::connect(
        Arc::new(Config::default()),
        (endpoint.hostname.as_str(), endpoint.port),
        handler,
    );

    let mut handle = match tokio::time::timeout(options.connect_timeout, connect).await {
        Err(_) => {
            return Err(dial_error(format!(
                "timed out after {:?}",
                options.connect_timeout
            )))
        }
        Ok(Err(HandlerError::HostKey(reason))) => {
            return Err(ConnectionError::HostVerification {
                host_tag: endpoint.host_tag.clone(),
                address,
                reason,
            })
        }
        Ok(Err(HandlerError::Transport(russh::Error::UnknownKey))) => {
            return Err(ConnectionError::HostVerification {
                host_tag: endpoint.host_tag.clone(),
                address,
                reason: "server key was rejected".to_string(),
            })
        }
        Ok(Err(e)) => return Err(dial_error(e.to_string())),
        Ok(Ok(handle)) => handle,
    };

    tracing::debug!(
        "[{}] authenticating as user '{}'",
        endpoint.host_tag,
        endpoint.username
    );
    let key = Arc::new(credential.into_key());
    let authenticated = handle
        .authenticate_publickey(endpoint.username.clone(), key)
        .await;

    match authenticated {
        Ok(true) => {}
        Ok(false) => {
            disconnect_quietly(&handle, &endpoint.host_tag).await;
            return Err(ConnectionError::Auth {
                host_tag: endpoint.host_tag.clone(),
                username: endpoint.username.clone(),
            });
        }
        Err(e) => {
            disconnect_quietly(&handle, &endpoint.host_tag).await;
            return Err(dial_error(format!("authentication error: {}", e)));
        }
    }

    tracing::info!("[{}] connected to {}", endpoint.host_tag, address);
    Ok(ClientConnection::new(
        endpoint.host_tag.clone(),
        endpoint.remote_file.clone(),
        SshConnection { handle },
    ))
}

async fn disconnect_quietly(handle: &Handle<ClientHandler>, host_tag: &str) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "authentication failed", "en")
        .await
    {
        tracing::debug!("[{}] disconnect after failed auth: {}", host_tag, e);
    }
}

/// Produces live connections for the hosts of a spec
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: TailConnection;

    /// Resolve a credential for `endpoint` and connect to it
    async fn connect(
        &self,
        endpoint: &HostEndpoint,
    ) -> Result<ClientConnection<Self::Connection>, TailError>;
}

/// [`Connector`] that loads keys from disk and dials over SSH
pub struct SshConnector {
    key_paths: BTreeMap<String, PathBuf>,
    fallback_key: PathBuf,
    options: ConnectOptions,
    prompt: Arc<dyn PassphrasePrompt>,
}

impl SshConnector {
    pub fn new(
        spec: &SpecFile,
        config: &UserConfig,
        options: ConnectOptions,
        prompt: Arc<dyn PassphrasePrompt>,
    ) -> Self {
        let fallback_key = config.fallback_key();
        let key_paths = spec
            .hosts
            .keys()
            .map(|tag| (tag.clone(), spec.key_path(tag, &fallback_key)))
            .collect();

        Self {
            key_paths,
            fallback_key,
            options,
            prompt,
        }
    }

    /// Key path used for `host_tag`
    pub fn key_path(&self, host_tag: &str) -> &Path {
        self.key_paths
            .get(host_tag)
            .map(PathBuf::as_path)
            .unwrap_or(&self.fallback_key)
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Connection = SshConnection;

    async fn connect(
        &self,
        endpoint: &HostEndpoint,
    ) -> Result<ClientConnection<SshConnection>, TailError> {
        let credential =
            load_credential(&endpoint.host_tag, self.key_path(&endpoint.host_tag), &*self.prompt)?;
        Ok(establish(endpoint, credential, &self.options).await?)
    }
}

/// An authenticated russh client connection
pub struct SshConnection {
    handle: Handle<ClientHandler>,
}

#[async_trait]
impl TailConnection for SshConnection {
    type Channel = SshChannel;

    async fn open_channel(&self) -> Result<SshChannel, TransportError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;
        Ok(SshChannel { channel })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
            .map_err(|e| TransportError::new(format!("disconnect: {}", e)))
    }
}

/// A session channel on an [`SshConnection`]
pub struct SshChannel {
    channel: Channel<Msg>,
}

#[async_trait]
impl TailChannel for SshChannel {
    async fn exec(&mut self, command: &str) -> Result<(), TransportError> {
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| TransportError::new(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.channel.wait().await? {
                ChannelMsg::Data { data } => {
                    return Some(ChannelEvent::Stdout(Bytes::copy_from_slice(&data)))
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    return Some(ChannelEvent::ExitStatus(exit_status))
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    return Some(ChannelEvent::ExitSignal(format!("{:?}", signal_name)))
                }
                ChannelMsg::Eof => return Some(ChannelEvent::Eof),
                ChannelMsg::Close => return None,
                // stderr, window adjustments and request replies are not forwarded
                _ => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.channel
            .close()
            .await
            .map_err(|e| TransportError::new(format!("channel close: {}", e)))
    }
}

/// Errors raised from inside the SSH client handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Transport(#[from] russh::Error),

    #[error("{0}")]
    HostKey(String),
}

/// SSH client handler for one host
struct ClientHandler {
    host_tag: String,
    hostname: String,
    port: u16,
    policy: HostKeyPolicy,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = HandlerError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(
            "[{}] server host key: {}",
            self.host_tag,
            server_public_key.fingerprint()
        );
        verify_host_key(&self.policy, &self.hostname, self.port, server_public_key)
            .map_err(HandlerError::HostKey)?;
        Ok(true)
    }
}

/// Check `key` for `hostname:port` against `policy`
fn verify_host_key(
    policy: &HostKeyPolicy,
    hostname: &str,
    port: u16,
    key: &PublicKey,
) -> Result<(), String> {
    match policy {
        HostKeyPolicy::SkipVerification => {
            tracing::warn!(
                "Host key verification disabled, accepting key for {}:{}",
                hostname,
                port
            );
            Ok(())
        }
        HostKeyPolicy::KnownHosts(path) => {
            match russh_keys::check_known_hosts_path(hostname, port, key, path) {
                Ok(true) => Ok(()),
                Ok(false) => Err(format!(
                    "no entry for {}:{} in {}",
                    hostname,
                    port,
                    path.display()
                )),
                Err(russh_keys::Error::KeyChanged { line }) => Err(format!(
                    "host key has changed (known_hosts line {})",
                    line
                )),
                Err(e) => Err(format!(
                    "unable to check {}: {}",
                    path.display(),
                    e
                )),
            }
        }
    }
}
