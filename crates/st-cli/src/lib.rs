//! sshtail: tail files on many hosts at once
//!
//! Provides the `sshtail` CLI: spec file scaffolding, the default key
//! setting, and running a spec.

pub mod commands;
pub mod output;
