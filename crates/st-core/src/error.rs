//! Core error types for sshtail

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the sshtail ecosystem
#[derive(Error, Debug)]
pub enum TailError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Key loading error
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    /// Spec file error
    #[error("Spec error: {0}")]
    Spec(#[from] SpecError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Multiplexer lifecycle error
    #[error("{0}")]
    Multiplexer(#[from] MultiplexerError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TailError {
    /// Host tag the error is attributed to, if any
    pub fn host_tag(&self) -> Option<&str> {
        match self {
            TailError::Connection(e) => Some(e.host_tag()),
            TailError::Session(e) => Some(e.host_tag()),
            TailError::Key(KeyError::Prompt { host_tag, .. })
            | TailError::Key(KeyError::Decrypt { host_tag, .. })
            | TailError::Key(KeyError::NotFound { host_tag, .. })
            | TailError::Key(KeyError::Load { host_tag, .. }) => Some(host_tag),
            TailError::Spec(SpecError::InvalidHost { host_tag, .. }) => Some(host_tag),
            TailError::Multiplexer(MultiplexerError::Build { host_tag, .. })
            | TailError::Multiplexer(MultiplexerError::Start { host_tag, .. }) => Some(host_tag),
            _ => None,
        }
    }
}

/// Connection establishment errors. None of these are retried.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The network connection or SSH handshake could not be completed
    #[error("[{host_tag}] failed to connect to {address}: {reason}")]
    Dial {
        host_tag: String,
        address: String,
        reason: String,
    },

    /// The server rejected the supplied key
    #[error("[{host_tag}] authentication rejected for user '{username}'")]
    Auth { host_tag: String, username: String },

    /// The server identity did not match the trust store
    #[error("[{host_tag}] host key verification failed for {address}: {reason}")]
    HostVerification {
        host_tag: String,
        address: String,
        reason: String,
    },
}

impl ConnectionError {
    pub fn host_tag(&self) -> &str {
        match self {
            ConnectionError::Dial { host_tag, .. }
            | ConnectionError::Auth { host_tag, .. }
            | ConnectionError::HostVerification { host_tag, .. } => host_tag,
        }
    }
}

/// Remote session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// `start` called on a session that is already running
    #[error("[{host_tag}] tail session is already started")]
    AlreadyStarted { host_tag: String },

    /// `start` called on a session that was closed
    #[error("[{host_tag}] can't start a closed tail session")]
    AlreadyClosed { host_tag: String },

    /// The transport or output sink went away underneath the session
    #[error("[{host_tag}] session is closed: {reason}")]
    ClosedSession { host_tag: String, reason: String },

    /// Opening the command channel failed
    #[error("[{host_tag}] error establishing session: {reason}")]
    ChannelOpen { host_tag: String, reason: String },

    /// The remote command could not be launched
    #[error("[{host_tag}] failed to run '{command}': {reason}")]
    Exec {
        host_tag: String,
        command: String,
        reason: String,
    },

    /// One or more failures while closing the channel and connection
    #[error("[{host_tag}] error(s) closing tail session: {}", .reasons.join("; "))]
    Close {
        host_tag: String,
        reasons: Vec<String>,
    },
}

impl SessionError {
    pub fn host_tag(&self) -> &str {
        match self {
            SessionError::AlreadyStarted { host_tag }
            | SessionError::AlreadyClosed { host_tag }
            | SessionError::ClosedSession { host_tag, .. }
            | SessionError::ChannelOpen { host_tag, .. }
            | SessionError::Exec { host_tag, .. }
            | SessionError::Close { host_tag, .. } => host_tag,
        }
    }
}

/// Errors from building, starting or closing the set of sessions
#[derive(Error, Debug)]
pub enum MultiplexerError {
    /// Connecting to one host failed; every connection opened before it was closed
    #[error("failed to set up session: {source}")]
    Build {
        host_tag: String,
        #[source]
        source: Box<TailError>,
    },

    /// Starting one session failed; every session was closed
    #[error("failed to start session: {source}")]
    Start {
        host_tag: String,
        #[source]
        source: SessionError,
    },

    /// One or more sessions failed to close cleanly
    #[error("error(s) closing sessions: {}", format_failures(.failures))]
    Shutdown { failures: Vec<SessionError> },

    /// Writing merged output to the destination failed
    #[error("failed to write output: {source}")]
    Output {
        #[source]
        source: std::io::Error,
    },

    #[error("multiplexer was already started")]
    AlreadyStarted,

    #[error("multiplexer is closed")]
    Closed,
}

fn format_failures(failures: &[SessionError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure reported by an SSH transport or channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Private key loading errors
#[derive(Error, Debug)]
pub enum KeyError {
    /// Key file does not exist
    #[error("[{host_tag}] private key not found at {}", .path.display())]
    NotFound { host_tag: String, path: PathBuf },

    /// Key file could not be read or parsed
    #[error("[{host_tag}] failed to load key from {}: {reason}", .path.display())]
    Load {
        host_tag: String,
        path: PathBuf,
        reason: String,
    },

    /// Key is encrypted and the passphrase did not decrypt it
    #[error("[{host_tag}] failed to decrypt key {}", .path.display())]
    Decrypt { host_tag: String, path: PathBuf },

    /// Reading the passphrase failed
    #[error("[{host_tag}] failed to read passphrase: {reason}")]
    Prompt { host_tag: String, reason: String },
}

/// Spec file errors
#[derive(Error, Debug)]
pub enum SpecError {
    /// Spec file could not be read
    #[error("unable to read spec file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error
    #[error("unable to parse spec file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Spec has no hosts
    #[error("spec file does not define any hosts")]
    NoHosts,

    /// A host entry failed validation
    #[error("invalid host '{host_tag}': {reason}")]
    InvalidHost { host_tag: String, reason: String },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
