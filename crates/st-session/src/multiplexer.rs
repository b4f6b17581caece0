//! Output multiplexer
//!
//! Owns one [`RemoteSession`] per host and merges their output into a single
//! destination. Every session pushes prefixed chunks into one bounded channel;
//! exactly one relay task drains that channel into the destination, so writes
//! to the destination never interleave within a chunk.
//!
//! There is no ordering between hosts. Chunks from one host reach the
//! destination in the order the host produced them.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use futures::future::join_all;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use st_core::error::MultiplexerError;
use st_core::traits::TailConnection;
use st_core::HostEndpoint;

use crate::connector::Connector;
use crate::session::RemoteSession;

const NOT_STARTED: u8 = 0;
const RUNNING: u8 = 1;
const SHUTTING_DOWN: u8 = 2;
const STOPPED: u8 = 3;

/// How a [`OutputMultiplexer::run`] call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every remote tail ended on its own
    Completed,
    /// Shutdown was requested while tails were still running
    Interrupted,
}

/// Receiver and destination, held until the relay task takes them over
struct Pending<W> {
    rx: mpsc::Receiver<Bytes>,
    destination: W,
}

pub struct OutputMultiplexer<C: TailConnection, W> {
    sessions: Vec<RemoteSession<C>>,
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    pending: Mutex<Option<Pending<W>>>,
    relay: tokio::sync::Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    /// Serializes `start` and `close`
    lifecycle: tokio::sync::Mutex<()>,
    state: AtomicU8,
    shutdown: CancellationToken,
}

impl<C, W> OutputMultiplexer<C, W>
where
    C: TailConnection,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Connect to every endpoint in order and wrap each connection in a session.
    ///
    /// If any host fails, the connections opened so far are closed and the
    /// error names the failing host.
    pub async fn build<K>(
        endpoints: &[HostEndpoint],
        connector: &K,
        destination: W,
        capacity: usize,
    ) -> Result<Self, MultiplexerError>
    where
        K: Connector<Connection = C>,
    {
        let mut sessions: Vec<RemoteSession<C>> = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            match connector.connect(endpoint).await {
                Ok(connection) => {
                    tracing::info!("Connected to {}", endpoint);
                    sessions.push(RemoteSession::new(connection));
                }
                Err(e) => {
                    tracing::error!("[{}] connection failed: {}", endpoint.host_tag, e);
                    for session in &sessions {
                        if let Err(close_err) = session.close().await {
                            tracing::warn!("{}", close_err);
                        }
                    }
                    return Err(MultiplexerError::Build {
                        host_tag: endpoint.host_tag.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }

        let (tx, rx) = mpsc::channel(capacity.max(1));
        Ok(Self {
            sessions,
            tx: Mutex::new(Some(tx)),
            pending: Mutex::new(Some(Pending { rx, destination })),
            relay: tokio::sync::Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            state: AtomicU8::new(NOT_STARTED),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn sessions(&self) -> &[RemoteSession<C>] {
        &self.sessions
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RUNNING
    }

    /// Token cancelled once shutdown has begun
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start every session and the relay task.
    ///
    /// If any session fails to start, every session is closed and the error
    /// names the failing host.
    pub async fn start(&self) -> Result<(), MultiplexerError> {
        let _lifecycle = self.lifecycle.lock().await;

        if let Err(state) =
            self.state
                .compare_exchange(NOT_STARTED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
        {
            return Err(if state == RUNNING {
                MultiplexerError::AlreadyStarted
            } else {
                MultiplexerError::Closed
            });
        }

        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(MultiplexerError::Closed)?;

        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(Pending { rx, destination }) = pending {
            *self.relay.lock().await = Some(tokio::spawn(relay(
                rx,
                destination,
                self.shutdown.clone(),
            )));
        }

        for session in &self.sessions {
            if session.is_started() || session.is_closed() {
                continue;
            }
            if let Err(e) = session.start(tx.clone()).await {
                tracing::error!("{}", e);
                self.state.store(SHUTTING_DOWN, Ordering::SeqCst);
                self.shutdown.cancel();
                if let Err(close_err) = self.close_sessions().await {
                    tracing::warn!("{}", close_err);
                }
                drop(tx);
                self.release_output();
                if let Err(e) = self.drain().await {
                    tracing::warn!("{}", e);
                }
                self.state.store(STOPPED, Ordering::SeqCst);
                return Err(MultiplexerError::Start {
                    host_tag: session.host_tag().to_string(),
                    source: e,
                });
            }
        }

        tracing::info!("Started {} tail session(s)", self.sessions.len());
        Ok(())
    }

    /// [`start`](Self::start), then [`wait`](Self::wait)
    pub async fn run(&self) -> Result<RunOutcome, MultiplexerError> {
        self.start().await?;
        self.wait().await
    }

    /// Wait until every remote tail has ended or shutdown was requested.
    /// Closes everything and flushes buffered output before returning.
    ///
    /// A failed write to the destination also ends the wait; it is reported
    /// ahead of any close failures it caused.
    pub async fn wait(&self) -> Result<RunOutcome, MultiplexerError> {
        let finished = join_all(self.sessions.iter().map(|s| s.finished()));
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => RunOutcome::Interrupted,
            _ = finished => {
                tracing::info!("All remote tails have ended");
                RunOutcome::Completed
            }
        };

        let closed = self.close().await;
        self.drain().await?;
        closed.map(|()| outcome)
    }

    /// Close every session.
    ///
    /// Idempotent: later calls find nothing left to close and return `Ok`.
    /// Every session gets its close attempt; failures are returned together.
    pub async fn close(&self) -> Result<(), MultiplexerError> {
        self.shutdown.cancel();
        let _lifecycle = self.lifecycle.lock().await;
        self.state.store(SHUTTING_DOWN, Ordering::SeqCst);
        let result = self.close_sessions().await;
        self.release_output();
        self.state.store(STOPPED, Ordering::SeqCst);
        result
    }

    async fn close_sessions(&self) -> Result<(), MultiplexerError> {
        let mut failures = Vec::new();
        for session in &self.sessions {
            if session.is_closed() {
                continue;
            }
            if let Err(e) = session.close().await {
                tracing::warn!("{}", e);
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MultiplexerError::Shutdown { failures })
        }
    }

    /// Drop the multiplexer's own sender so the relay ends once sessions are gone
    fn release_output(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Wait for the relay task to write out everything still queued
    async fn drain(&self) -> Result<(), MultiplexerError> {
        let relay = self.relay.lock().await.take();
        let Some(relay) = relay else {
            return Ok(());
        };
        let result = match relay.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
        };
        match result {
            Ok(()) => {
                tracing::debug!("Output relay finished");
                Ok(())
            }
            Err(source) => Err(MultiplexerError::Output { source }),
        }
    }
}

/// Copy chunks to the destination until every sender is gone.
///
/// A failed write cancels `shutdown`; nothing can be delivered after it.
async fn relay<W: AsyncWrite + Unpin>(
    mut rx: mpsc::Receiver<Bytes>,
    mut destination: W,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let result = copy_chunks(&mut rx, &mut destination).await;
    if let Err(e) = &result {
        tracing::error!("Writing output failed: {}", e);
        shutdown.cancel();
    }
    result
}

async fn copy_chunks<W: AsyncWrite + Unpin>(
    rx: &mut mpsc::Receiver<Bytes>,
    destination: &mut W,
) -> std::io::Result<()> {
    while let Some(chunk) = rx.recv().await {
        destination.write_all(&chunk).await?;
        destination.flush().await?;
    }
    destination.shutdown().await
}
