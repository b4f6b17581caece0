//! st-core: Core abstractions and configuration for sshtail
//!
//! This crate provides the host and spec file types, error taxonomy,
//! user configuration, and the transport traits the session layer is
//! written against.

pub mod config;
pub mod error;
pub mod spec;
pub mod traits;
pub mod types;

pub use error::TailError;
pub use types::{HostEndpoint, HostKeyPolicy, DEFAULT_SSH_PORT};
