//! sshtail CLI
//!
//! Tails files on many hosts over SSH and merges their output into one
//! stream, each line prefixed with the host it came from.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sshtail::commands::{self, InitOptions, RunOptions};
use sshtail::output::print_error;

#[derive(Parser)]
#[command(name = "sshtail")]
#[command(author, version, about = "Tail files on many hosts over SSH")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and run spec files listing hosts and the files to tail
    Spec {
        #[command(subcommand)]
        action: SpecAction,
    },

    /// Set the default SSH key used for hosts without their own key
    Usekey {
        /// Path to the private key
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum SpecAction {
    /// Create a starter spec file (YAML) with the given name
    Init {
        /// Spec file name; .yml is appended when missing
        name: String,
        /// Include comments explaining the format
        #[arg(long)]
        with_comments: bool,
        /// Leave out the keys section to keep the spec portable
        #[arg(long)]
        exclude_keys: bool,
        /// Replace an existing file without asking
        #[arg(long)]
        overwrite: bool,
    },

    /// Connect to every host in a spec file and tail the files it lists
    Run {
        /// Spec file to run
        file: PathBuf,
        /// Accept any host key (insecure)
        #[arg(long)]
        skip_host_key_check: bool,
        /// known_hosts file to verify host keys against
        #[arg(long, value_name = "PATH", conflicts_with = "skip_host_key_check")]
        known_hosts: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    // Logs go to stderr; stdout carries the tailed output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = dispatch(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Spec { action } => match action {
            SpecAction::Init {
                name,
                with_comments,
                exclude_keys,
                overwrite,
            } => {
                commands::init_command(&InitOptions {
                    name,
                    with_comments,
                    exclude_keys,
                    overwrite,
                })?;
            }
            SpecAction::Run {
                file,
                skip_host_key_check,
                known_hosts,
            } => {
                commands::run_command(RunOptions {
                    spec_path: file,
                    config_path: cli.config,
                    skip_host_key_check,
                    known_hosts,
                })
                .await?;
            }
        },

        Commands::Usekey { path } => {
            let config_path = commands::config_path(cli.config.as_deref());
            commands::usekey_command(&config_path, &path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_global_flags() {
        let cli = Cli::parse_from([
            "sshtail",
            "spec",
            "run",
            "cluster.yml",
            "-vv",
            "--config",
            "/tmp/sshtail.toml",
            "--known-hosts",
            "/tmp/known_hosts",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/sshtail.toml")));
        match cli.command {
            Commands::Spec {
                action:
                    SpecAction::Run {
                        file,
                        skip_host_key_check,
                        known_hosts,
                    },
            } => {
                assert_eq!(file, PathBuf::from("cluster.yml"));
                assert!(!skip_host_key_check);
                assert_eq!(known_hosts, Some(PathBuf::from("/tmp/known_hosts")));
            }
            _ => panic!("expected spec run"),
        }
    }

    #[test]
    fn test_skip_and_known_hosts_conflict() {
        let result = Cli::try_parse_from([
            "sshtail",
            "spec",
            "run",
            "cluster.yml",
            "--skip-host-key-check",
            "--known-hosts",
            "/tmp/known_hosts",
        ]);
        assert!(result.is_err());
    }
}
