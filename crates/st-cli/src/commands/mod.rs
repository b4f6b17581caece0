//! CLI command implementations

mod init;
mod run;
mod usekey;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use st_core::config::{self, UserConfig};
use st_core::error::ConfigError;

pub use init::{init_command, spec_file_name, InitOptions};
pub use run::{resolve_host_key_policy, run_command, RunOptions};
pub use usekey::usekey_command;

/// Config file path: the `--config` override or the default location
pub fn config_path(override_path: Option<&Path>) -> PathBuf {
    override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Load the user config, falling back to defaults when the file is missing
pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    match config::load_config(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(UserConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load config file {:?}", path)),
    }
}
