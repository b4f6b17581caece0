//! Connection traits

use async_trait::async_trait;

use super::channel::TailChannel;
use crate::error::TransportError;

/// An authenticated connection to one remote host
#[async_trait]
pub trait TailConnection: Send + Sync + 'static {
    /// The command channel type opened on this connection
    type Channel: TailChannel;

    /// Open a new session channel for running a command
    async fn open_channel(&self) -> Result<Self::Channel, TransportError>;

    /// Disconnect from the host
    async fn close(&self) -> Result<(), TransportError>;
}

/// A live connection together with what it was opened for
pub struct ClientConnection<C> {
    pub host_tag: String,
    pub remote_file: String,
    pub transport: C,
}

impl<C: TailConnection> ClientConnection<C> {
    pub fn new(host_tag: impl Into<String>, remote_file: impl Into<String>, transport: C) -> Self {
        Self {
            host_tag: host_tag.into(),
            remote_file: remote_file.into(),
            transport,
        }
    }

    /// The remote command run on this connection
    pub fn tail_command(&self) -> String {
        format!("tail -n 0 -f {}", self.remote_file)
    }
}
