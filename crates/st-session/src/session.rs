//! Remote tail sessions
//!
//! A [`RemoteSession`] owns one connection and, once started, one command
//! channel running `tail -n 0 -f <file>`. Output chunks are prefixed with the
//! host tag and pushed into the shared output channel by a background task.
//!
//! Lifecycle: `Created -> Started -> Closed`. `Closed` is terminal.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use st_core::error::{SessionError, TransportError};
use st_core::traits::{ChannelEvent, ClientConnection, TailChannel, TailConnection};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Started,
    Closed,
}

/// Writer that tags every chunk with `"[ <host_tag> ] "` before handing it
/// to the shared output channel. Chunks are forwarded as received; no line
/// splitting happens here.
#[derive(Clone)]
pub struct PrefixedSink {
    prefix: Bytes,
    tx: mpsc::Sender<Bytes>,
}

impl PrefixedSink {
    pub fn new(host_tag: &str, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            prefix: Bytes::from(format!("[ {} ] ", host_tag)),
            tx,
        }
    }

    /// Forward one chunk, returning the number of payload bytes consumed
    pub async fn write(&self, data: &[u8]) -> Result<usize, mpsc::error::SendError<Bytes>> {
        let mut chunk = BytesMut::with_capacity(self.prefix.len() + data.len());
        chunk.extend_from_slice(&self.prefix);
        chunk.extend_from_slice(data);
        self.tx.send(chunk.freeze()).await?;
        Ok(data.len())
    }
}

/// How the remote command ended, if it reported anything
#[derive(Debug, Clone, PartialEq, Eq)]
enum RemoteExit {
    Status(u32),
    Signal(String),
}

/// What the background task saw by the time it stopped
#[derive(Debug)]
struct PumpOutcome {
    exit: Option<RemoteExit>,
    /// True when the task stopped because the session was closed
    cancelled: bool,
    /// True when the task stopped because nothing reads the output any more
    output_lost: bool,
    channel_close: Result<(), TransportError>,
}

impl PumpOutcome {
    fn problems(self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Err(e) = self.channel_close {
            problems.push(e.to_string());
        }
        match self.exit {
            Some(RemoteExit::Status(0)) => {}
            Some(RemoteExit::Status(code)) => {
                problems.push(format!("remote command exited with status {}", code))
            }
            Some(RemoteExit::Signal(signal)) => {
                problems.push(format!("remote command killed by signal {}", signal))
            }
            None if !self.cancelled && !self.output_lost => {
                problems.push("output stream ended without an exit status".to_string())
            }
            None => {}
        }
        problems
    }
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<PumpOutcome>,
}

/// One connection plus the tail command running on it
pub struct RemoteSession<C: TailConnection> {
    connection: ClientConnection<C>,
    running: Mutex<Option<Running>>,
    started: AtomicBool,
    closed: AtomicBool,
    /// Cancelled exactly once, when the background task ends or the session
    /// is closed without ever starting
    finished: CancellationToken,
}

impl<C: TailConnection> RemoteSession<C> {
    /// Wrap a connection in a session ready to be started
    pub fn new(connection: ClientConnection<C>) -> Self {
        Self {
            connection,
            running: Mutex::new(None),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            finished: CancellationToken::new(),
        }
    }

    pub fn host_tag(&self) -> &str {
        &self.connection.host_tag
    }

    /// Whether the session has been started. Stays true after close.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether the session has been closed. A closed session cannot be restarted.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        if self.is_closed() {
            SessionState::Closed
        } else if self.is_started() {
            SessionState::Started
        } else {
            SessionState::Created
        }
    }

    /// Resolves once the session's output task has ended
    pub async fn finished(&self) {
        self.finished.cancelled().await
    }

    /// Open a command channel, start the tail, and pump its stdout into
    /// `output` from a background task.
    pub async fn start(&self, output: mpsc::Sender<Bytes>) -> Result<(), SessionError> {
        let mut running = self.running.lock().await;
        if self.is_closed() {
            return Err(SessionError::AlreadyClosed {
                host_tag: self.host_tag().to_string(),
            });
        }
        if self.is_started() {
            return Err(SessionError::AlreadyStarted {
                host_tag: self.host_tag().to_string(),
            });
        }

        let mut channel = self.connection.transport.open_channel().await.map_err(|e| {
            SessionError::ChannelOpen {
                host_tag: self.host_tag().to_string(),
                reason: e.to_string(),
            }
        })?;

        let command = self.connection.tail_command();
        if let Err(e) = channel.exec(&command).await {
            if let Err(close_err) = channel.close().await {
                tracing::debug!("[{}] closing failed channel: {}", self.host_tag(), close_err);
            }
            return Err(SessionError::Exec {
                host_tag: self.host_tag().to_string(),
                command,
                reason: e.to_string(),
            });
        }
        tracing::debug!("[{}] running '{}'", self.host_tag(), command);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(
            self.host_tag().to_string(),
            channel,
            PrefixedSink::new(self.host_tag(), output),
            cancel.clone(),
            self.finished.clone().drop_guard(),
        ));

        *running = Some(Running { cancel, task });
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop the tail and disconnect.
    ///
    /// Idempotent: only the first call does any work. The connection is
    /// closed even when closing the channel fails; every failure is
    /// reported in one [`SessionError::Close`], or in a
    /// [`SessionError::ClosedSession`] when the output went away first.
    pub async fn close(&self) -> Result<(), SessionError> {
        let mut running = self.running.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!("Closing session to {}", self.host_tag());
        let mut reasons = Vec::new();
        let mut output_lost = false;

        if let Some(Running { cancel, task }) = running.take() {
            cancel.cancel();
            match task.await {
                Ok(outcome) => {
                    output_lost = outcome.output_lost;
                    reasons.extend(outcome.problems());
                }
                Err(e) => reasons.push(format!("session task failed: {}", e)),
            }
        }
        self.finished.cancel();

        if let Err(e) = self.connection.transport.close().await {
            reasons.push(e.to_string());
        }

        let host_tag = self.host_tag().to_string();
        if output_lost {
            reasons.insert(0, "output destination went away".to_string());
            Err(SessionError::ClosedSession {
                host_tag,
                reason: reasons.join("; "),
            })
        } else if reasons.is_empty() {
            Ok(())
        } else {
            Err(SessionError::Close { host_tag, reasons })
        }
    }
}

/// Copy channel output into the sink until the channel ends or `cancel` fires
async fn pump<Ch: TailChannel>(
    host_tag: String,
    mut channel: Ch,
    sink: PrefixedSink,
    cancel: CancellationToken,
    _finished: DropGuard,
) -> PumpOutcome {
    let mut exit = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let channel_close = channel.close().await;
                return PumpOutcome { exit, cancelled: true, output_lost: false, channel_close };
            }
            event = channel.next_event() => match event {
                Some(ChannelEvent::Stdout(data)) => {
                    let written = tokio::select! {
                        written = sink.write(&data) => written.is_ok(),
                        _ = cancel.cancelled() => false,
                    };
                    if !written {
                        let cancelled = cancel.is_cancelled();
                        if !cancelled {
                            tracing::warn!("[{}] output channel closed, stopping tail", host_tag);
                        }
                        let channel_close = channel.close().await;
                        return PumpOutcome { exit, cancelled, output_lost: !cancelled, channel_close };
                    }
                }
                Some(ChannelEvent::ExitStatus(code)) => {
                    tracing::debug!("[{}] remote command exited with status {}", host_tag, code);
                    exit = Some(RemoteExit::Status(code));
                }
                Some(ChannelEvent::ExitSignal(signal)) => {
                    tracing::debug!("[{}] remote command killed by {}", host_tag, signal);
                    exit = Some(RemoteExit::Signal(signal));
                }
                Some(ChannelEvent::Eof) => {
                    tracing::debug!("[{}] remote output reached EOF", host_tag);
                }
                None => {
                    tracing::warn!("[{}] remote tail stopped", host_tag);
                    return PumpOutcome {
                        exit,
                        cancelled: false,
                        output_lost: false,
                        channel_close: Ok(()),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeHost, FakeTransport};

    fn session(host: FakeHost) -> (RemoteSession<FakeTransport>, FakeTransport) {
        let transport = host.transport();
        let connection = ClientConnection::new(host.tag.clone(), host.file.clone(), transport.clone());
        (RemoteSession::new(connection), transport)
    }

    #[tokio::test]
    async fn test_prefixed_sink_keeps_bytes_verbatim() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = PrefixedSink::new("web1", tx);

        let written = sink.write(b"partial line without newline").await.unwrap();
        assert_eq!(written, 28);
        assert_eq!(
            rx.recv().await.unwrap(),
            Bytes::from_static(b"[ web1 ] partial line without newline")
        );
    }

    #[tokio::test]
    async fn test_start_runs_tail_command() {
        let (session, transport) = session(FakeHost::new("web1").file("/var/log/app.log"));
        let (tx, _rx) = mpsc::channel(4);

        assert_eq!(session.state(), SessionState::Created);
        session.start(tx).await.unwrap();
        assert_eq!(session.state(), SessionState::Started);
        assert_eq!(transport.commands(), vec!["tail -n 0 -f /var/log/app.log"]);

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (session, _transport) = session(FakeHost::new("web1"));
        let (tx, _rx) = mpsc::channel(4);

        session.start(tx.clone()).await.unwrap();
        let err = session.start(tx).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyStarted { ref host_tag } if host_tag == "web1"));
        assert_eq!(session.state(), SessionState::Started);

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_after_close_rejected() {
        let (session, _transport) = session(FakeHost::new("web1"));
        let (tx, _rx) = mpsc::channel(4);

        session.close().await.unwrap();
        let err = session.start(tx).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyClosed { .. }));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (session, transport) = session(FakeHost::new("web1"));
        let (tx, _rx) = mpsc::channel(4);

        session.start(tx).await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(transport.channel_closes(), 1);
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_output_is_prefixed_in_order() {
        let host = FakeHost::new("tail1").output(&["line-A\n", "line-B\n"]);
        let (session, _transport) = session(host);
        let (tx, mut rx) = mpsc::channel(4);

        session.start(tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"[ tail1 ] line-A\n"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"[ tail1 ] line-B\n"));

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_on_dead_connection_reports_error() {
        let (session, transport) = session(FakeHost::new("web1"));
        let (tx, _rx) = mpsc::channel(4);

        session.start(tx).await.unwrap();
        transport.kill();
        session.finished().await;

        let err = session.close().await.unwrap_err();
        assert!(matches!(err, SessionError::Close { ref host_tag, .. } if host_tag == "web1"));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_nonzero_exit_reported_at_close() {
        let host = FakeHost::new("web1").exit_status(1);
        let (session, _transport) = session(host);
        let (tx, _rx) = mpsc::channel(4);

        session.start(tx).await.unwrap();
        session.finished().await;

        match session.close().await {
            Err(SessionError::Close { reasons, .. }) => {
                assert!(reasons.iter().any(|r| r.contains("exited with status 1")));
            }
            other => panic!("expected close error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lost_output_ends_session_task() {
        let host = FakeHost::new("web1").output(&["line-A\n"]);
        let (session, transport) = session(host);
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        session.start(tx).await.unwrap();
        session.finished().await;
        assert_eq!(transport.channel_closes(), 1);

        match session.close().await {
            Err(SessionError::ClosedSession { host_tag, reason }) => {
                assert_eq!(host_tag, "web1");
                assert!(reason.contains("output destination went away"));
            }
            other => panic!("expected closed session error, got {:?}", other),
        }
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_channel_open_failure() {
        let (session, _transport) = session(FakeHost::new("web1").fail_open());
        let (tx, _rx) = mpsc::channel(4);

        let err = session.start(tx).await.unwrap_err();
        assert!(matches!(err, SessionError::ChannelOpen { .. }));
        assert_eq!(session.state(), SessionState::Created);
    }
}
