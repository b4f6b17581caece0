//! `sshtail spec run`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use dialoguer::Password;

use st_core::config::{expand_tilde, UserConfig};
use st_core::spec::SpecFile;
use st_core::HostKeyPolicy;
use st_session::{run_tail, PassphrasePrompt, RunConfig, RunObserver, RunOutcome};

use super::{config_path, load_user_config};
use crate::output::{print_info, print_success, print_warning};

/// Options for running a spec file
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub spec_path: PathBuf,
    /// User config override (`--config`)
    pub config_path: Option<PathBuf>,
    /// Accept any host key
    pub skip_host_key_check: bool,
    /// known_hosts file overriding the configured one
    pub known_hosts: Option<PathBuf>,
}

/// Host key policy for a run: command-line flags win over the config file
pub fn resolve_host_key_policy(config: &UserConfig, options: &RunOptions) -> HostKeyPolicy {
    if options.skip_host_key_check {
        return HostKeyPolicy::SkipVerification;
    }
    match &options.known_hosts {
        Some(path) => HostKeyPolicy::KnownHosts(expand_tilde(path)),
        None => config.host_key_policy(),
    }
}

/// Tail every host in the spec to stdout until interrupted
pub async fn run_command(options: RunOptions) -> Result<()> {
    let spec = SpecFile::read(&options.spec_path).with_context(|| {
        format!(
            "Unable to parse spec file '{}'",
            options.spec_path.display()
        )
    })?;
    let user = load_user_config(&config_path(options.config_path.as_deref()))?;

    let host_key_policy = resolve_host_key_policy(&user, &options);
    if host_key_policy == HostKeyPolicy::SkipVerification {
        print_warning("Host key verification is disabled");
    }

    let config = RunConfig {
        user,
        host_key_policy,
        prompt: Arc::new(DialoguerPrompt),
        observer: Arc::new(TerminalObserver),
    };

    let outcome = run_tail(&spec, config, tokio::io::stdout()).await?;
    if outcome == RunOutcome::Completed {
        print_info("All remote tails have ended");
    }
    print_success("Shut down complete");
    Ok(())
}

/// Reads key passphrases from the terminal without echo
struct DialoguerPrompt;

impl PassphrasePrompt for DialoguerPrompt {
    fn passphrase(&self, host_tag: &str, path: &Path) -> Result<String, String> {
        print_info(&format!("Key {} requires a passphrase", path.display()));
        Password::new()
            .with_prompt(format!("Enter passphrase for {} ({})", path.display(), host_tag))
            .interact()
            .map_err(|e| e.to_string())
    }
}

struct TerminalObserver;

impl RunObserver for TerminalObserver {
    fn started(&self, _hosts: usize) {
        print_info("Started tailing, send interrupt signal to exit");
    }

    fn interrupted(&self) {
        print_info("Signal received, closing sessions");
    }
}
