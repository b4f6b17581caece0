//! Interrupt handling
//!
//! Listens for SIGINT/SIGTERM (Ctrl-C elsewhere) once per multiplexer and
//! closes it on the first signal. The normal end-of-stream path closes the
//! same multiplexer; both paths go through its idempotent `close()`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;

use st_core::error::MultiplexerError;
use st_core::traits::TailConnection;

use crate::multiplexer::OutputMultiplexer;

/// Hooks for reporting run progress to the operator
pub trait RunObserver: Send + Sync {
    /// Every session has started
    fn started(&self, _hosts: usize) {}

    /// An interrupt was received and sessions are being closed
    fn interrupted(&self) {}
}

/// Observer that reports nothing
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

pub struct ShutdownCoordinator {
    triggered: Arc<AtomicBool>,
    task: JoinHandle<Option<Result<(), MultiplexerError>>>,
}

impl ShutdownCoordinator {
    /// Close `mux` on the first SIGINT or SIGTERM
    pub fn install<C, W>(mux: Arc<OutputMultiplexer<C, W>>, observer: Arc<dyn RunObserver>) -> Self
    where
        C: TailConnection,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_signal(mux, observer, wait_for_signal())
    }

    /// Close `mux` once `signal` resolves, unless the multiplexer shut down first
    pub fn with_signal<C, W, F>(
        mux: Arc<OutputMultiplexer<C, W>>,
        observer: Arc<dyn RunObserver>,
        signal: F,
    ) -> Self
    where
        C: TailConnection,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let triggered = Arc::new(AtomicBool::new(false));
        let shutdown = mux.shutdown_token();

        let task = tokio::spawn({
            let triggered = triggered.clone();
            async move {
                tokio::select! {
                    _ = signal => {
                        triggered.store(true, Ordering::SeqCst);
                        tracing::info!("Signal received, closing sessions");
                        observer.interrupted();
                        Some(mux.close().await)
                    }
                    _ = shutdown.cancelled() => None,
                }
            }
        });

        Self { triggered, task }
    }

    /// Whether shutdown was triggered by a signal
    pub fn was_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait for the listener to end. Call after the multiplexer has shut
    /// down. Returns the signal-initiated close result, if there was one.
    pub async fn finish(self) -> Option<Result<(), MultiplexerError>> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Signal listener failed: {}", e);
                None
            }
        }
    }
}

/// Resolves on the first SIGINT or SIGTERM
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received Ctrl+C");
        }
        _ = terminate => {
            tracing::debug!("Received SIGTERM");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{endpoint, FakeConnector, FakeHost};
    use crate::multiplexer::RunOutcome;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct CountingObserver {
        interrupts: AtomicUsize,
    }

    impl RunObserver for CountingObserver {
        fn interrupted(&self) {
            self.interrupts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_signal_closes_every_session() {
        let connector = FakeConnector::default();
        let endpoints = vec![endpoint("a"), endpoint("b")];
        let (writer, _reader) = tokio::io::duplex(64);
        let mux = Arc::new(
            OutputMultiplexer::build(&endpoints, &connector, writer, 8)
                .await
                .unwrap(),
        );
        let observer = Arc::new(CountingObserver::default());
        let (signal_tx, signal_rx) = oneshot::channel::<()>();

        let coordinator = ShutdownCoordinator::with_signal(mux.clone(), observer.clone(), async {
            let _ = signal_rx.await;
        });

        mux.start().await.unwrap();
        signal_tx.send(()).unwrap();

        let outcome = mux.wait().await.unwrap();
        assert_eq!(outcome, RunOutcome::Interrupted);
        assert!(coordinator.was_triggered());
        assert!(matches!(coordinator.finish().await, Some(Ok(()))));
        assert_eq!(observer.interrupts.load(Ordering::SeqCst), 1);
        assert!(mux.sessions().iter().all(|s| s.is_closed()));
        assert!(connector.opened().iter().all(|t| t.disconnects() == 1));
    }

    #[tokio::test]
    async fn test_natural_end_stops_listener() {
        let connector = FakeConnector::default().host(FakeHost::new("a").exit_status(0));
        let (writer, _reader) = tokio::io::duplex(64);
        let mux = Arc::new(
            OutputMultiplexer::build(&[endpoint("a")], &connector, writer, 8)
                .await
                .unwrap(),
        );

        let coordinator = ShutdownCoordinator::with_signal(
            mux.clone(),
            Arc::new(SilentObserver),
            std::future::pending::<()>(),
        );

        assert_eq!(mux.run().await.unwrap(), RunOutcome::Completed);
        assert!(!coordinator.was_triggered());
        assert!(coordinator.finish().await.is_none());
    }
}
