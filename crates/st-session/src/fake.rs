//! In-memory transport used by the unit tests

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use st_core::error::{ConnectionError, TransportError};
use st_core::traits::{ChannelEvent, ClientConnection, TailChannel, TailConnection};
use st_core::{HostEndpoint, TailError};

use crate::connector::Connector;

/// Scripted behavior of one fake host
#[derive(Debug, Clone)]
pub(crate) struct FakeHost {
    pub tag: String,
    pub file: String,
    events: Vec<ChannelEvent>,
    hold_open: bool,
    fail_open: bool,
}

impl FakeHost {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            file: "/var/log/syslog".to_string(),
            events: Vec::new(),
            hold_open: true,
            fail_open: false,
        }
    }

    pub fn file(mut self, file: &str) -> Self {
        self.file = file.to_string();
        self
    }

    pub fn output(mut self, chunks: &[&str]) -> Self {
        self.events.extend(
            chunks
                .iter()
                .map(|c| ChannelEvent::Stdout(Bytes::copy_from_slice(c.as_bytes()))),
        );
        self
    }

    /// The remote command exits with `code` after its output
    pub fn exit_status(mut self, code: u32) -> Self {
        self.events.push(ChannelEvent::ExitStatus(code));
        self.events.push(ChannelEvent::Eof);
        self.hold_open = false;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            state: Arc::new(FakeState {
                host: self.clone(),
                commands: Mutex::new(Vec::new()),
                channel_closes: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
                dead: CancellationToken::new(),
            }),
        }
    }
}

struct FakeState {
    host: FakeHost,
    commands: Mutex<Vec<String>>,
    channel_closes: AtomicUsize,
    disconnects: AtomicUsize,
    dead: CancellationToken,
}

/// Shared handle to one fake connection
#[derive(Clone)]
pub(crate) struct FakeTransport {
    state: Arc<FakeState>,
}

impl FakeTransport {
    pub fn tag(&self) -> &str {
        &self.state.host.tag
    }

    /// Drop the connection; every later operation on it fails
    pub fn kill(&self) {
        self.state.dead.cancel();
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }

    pub fn channel_closes(&self) -> usize {
        self.state.channel_closes.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TailConnection for FakeTransport {
    type Channel = FakeChannel;

    async fn open_channel(&self) -> Result<FakeChannel, TransportError> {
        if self.state.host.fail_open || self.state.dead.is_cancelled() {
            return Err(TransportError::new("channel open refused"));
        }
        Ok(FakeChannel {
            events: self.state.host.events.iter().cloned().collect(),
            state: self.state.clone(),
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.state.dead.is_cancelled() {
            return Err(TransportError::new("connection lost"));
        }
        Ok(())
    }
}

pub(crate) struct FakeChannel {
    events: VecDeque<ChannelEvent>,
    state: Arc<FakeState>,
}

#[async_trait]
impl TailChannel for FakeChannel {
    async fn exec(&mut self, command: &str) -> Result<(), TransportError> {
        self.state.commands.lock().unwrap().push(command.to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.state.dead.is_cancelled() {
            return None;
        }
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if self.state.host.hold_open {
            self.state.dead.cancelled().await;
        }
        None
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.channel_closes.fetch_add(1, Ordering::SeqCst);
        if self.state.dead.is_cancelled() {
            return Err(TransportError::new("channel already gone"));
        }
        Ok(())
    }
}

/// Connector handing out fake transports, refusing the hosts in `refuse`
#[derive(Default)]
pub(crate) struct FakeConnector {
    hosts: BTreeMap<String, FakeHost>,
    refuse: BTreeSet<String>,
    opened: Mutex<Vec<FakeTransport>>,
}

impl FakeConnector {
    pub fn host(mut self, host: FakeHost) -> Self {
        self.hosts.insert(host.tag.clone(), host);
        self
    }

    pub fn refuse(mut self, tag: &str) -> Self {
        self.refuse.insert(tag.to_string());
        self
    }

    pub fn opened(&self) -> Vec<FakeTransport> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeTransport;

    async fn connect(
        &self,
        endpoint: &HostEndpoint,
    ) -> Result<ClientConnection<FakeTransport>, TailError> {
        if self.refuse.contains(&endpoint.host_tag) {
            return Err(ConnectionError::Dial {
                host_tag: endpoint.host_tag.clone(),
                address: endpoint.address(),
                reason: "connection refused".to_string(),
            }
            .into());
        }
        let host = self
            .hosts
            .get(&endpoint.host_tag)
            .cloned()
            .unwrap_or_else(|| FakeHost::new(&endpoint.host_tag));
        let transport = host.transport();
        self.opened.lock().unwrap().push(transport.clone());
        Ok(ClientConnection::new(
            endpoint.host_tag.clone(),
            endpoint.remote_file.clone(),
            transport,
        ))
    }
}

/// Endpoint for `tag` tailing the default file
pub(crate) fn endpoint(tag: &str) -> HostEndpoint {
    HostEndpoint {
        host_tag: tag.to_string(),
        hostname: format!("{}.internal", tag),
        port: st_core::DEFAULT_SSH_PORT,
        username: "ops".to_string(),
        remote_file: "/var/log/syslog".to_string(),
    }
}
