//! Command channel traits

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Something observed on a running command channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A chunk of the command's standard output
    Stdout(Bytes),
    /// The remote command exited with a status code
    ExitStatus(u32),
    /// The remote command was killed by a signal
    ExitSignal(String),
    /// The remote side will send no more data
    Eof,
}

/// A channel running one remote command
#[async_trait]
pub trait TailChannel: Send + 'static {
    /// Start the remote command
    async fn exec(&mut self, command: &str) -> Result<(), TransportError>;

    /// Wait for the next event. `None` once the channel is gone.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Close the channel
    async fn close(&mut self) -> Result<(), TransportError>;
}
