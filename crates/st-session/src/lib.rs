//! st-session: remote tail sessions for sshtail
//!
//! Connects to every host in a spec, runs `tail -n 0 -f` on each, and merges
//! the output into one stream with every chunk prefixed by its host tag.
//!
//! The main pieces:
//! - [`connector`]: SSH dialing, host key checks and authentication
//! - [`session::RemoteSession`]: one connection plus its running tail
//! - [`multiplexer::OutputMultiplexer`]: all sessions and the merged output
//! - [`shutdown::ShutdownCoordinator`]: closes everything on SIGINT/SIGTERM

pub mod connector;
pub mod credential;
pub mod multiplexer;
pub mod session;
pub mod shutdown;

#[cfg(test)]
mod fake;

use std::sync::Arc;

use tokio::io::AsyncWrite;

use st_core::config::UserConfig;
use st_core::error::MultiplexerError;
use st_core::spec::SpecFile;
use st_core::traits::TailConnection;
use st_core::{HostKeyPolicy, TailError};

pub use connector::{ConnectOptions, Connector, SshConnector};
pub use credential::{load_credential, Credential, NoPrompt, PassphrasePrompt};
pub use multiplexer::{OutputMultiplexer, RunOutcome};
pub use session::{RemoteSession, SessionState};
pub use shutdown::{RunObserver, ShutdownCoordinator, SilentObserver};

/// Everything a run needs besides the spec and the destination
pub struct RunConfig {
    pub user: UserConfig,
    pub host_key_policy: HostKeyPolicy,
    pub prompt: Arc<dyn PassphrasePrompt>,
    pub observer: Arc<dyn RunObserver>,
}

impl RunConfig {
    /// Run settings taken from the user config, with no passphrase prompt
    pub fn new(user: UserConfig) -> Self {
        Self {
            host_key_policy: user.host_key_policy(),
            user,
            prompt: Arc::new(NoPrompt),
            observer: Arc::new(SilentObserver),
        }
    }
}

/// Tail every host in `spec` into `destination` until all tails end or the
/// process receives SIGINT/SIGTERM.
pub async fn run_tail<W>(
    spec: &SpecFile,
    config: RunConfig,
    destination: W,
) -> Result<RunOutcome, TailError>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let endpoints = spec.validate()?;
    tracing::debug!("Spec lists {} host(s)", endpoints.len());

    let options = ConnectOptions {
        host_key_policy: config.host_key_policy.clone(),
        ..ConnectOptions::from_config(&config.user)
    };
    let connector = SshConnector::new(spec, &config.user, options, config.prompt.clone());

    let mux = OutputMultiplexer::build(
        &endpoints,
        &connector,
        destination,
        config.user.channel_capacity,
    )
    .await?;
    let mux = Arc::new(mux);
    let coordinator = ShutdownCoordinator::install(mux.clone(), config.observer.clone());

    Ok(supervise(mux, coordinator, config.observer).await?)
}

/// Start `mux`, report it, and wait for it to shut down.
///
/// A signal that closes `mux` before it starts counts as an interrupt, not
/// a start failure.
async fn supervise<C, W>(
    mux: Arc<OutputMultiplexer<C, W>>,
    coordinator: ShutdownCoordinator,
    observer: Arc<dyn RunObserver>,
) -> Result<RunOutcome, MultiplexerError>
where
    C: TailConnection,
    W: AsyncWrite + Unpin + Send + 'static,
{
    if let Err(e) = mux.start().await {
        mux.shutdown_token().cancel();
        return match coordinator.finish().await {
            Some(Ok(())) => Ok(RunOutcome::Interrupted),
            Some(Err(close_err)) => Err(close_err),
            None => Err(e),
        };
    }
    observer.started(mux.sessions().len());

    let outcome = mux.wait().await;
    match coordinator.finish().await {
        Some(Err(e)) => Err(e),
        _ => outcome,
    }
}
