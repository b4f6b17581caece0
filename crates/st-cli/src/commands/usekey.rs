//! `sshtail usekey`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use st_core::config;

use super::load_user_config;
use crate::output::print_success;

/// Store `key` as the default key in the config at `config_path`.
///
/// The path is saved as given; `~` is expanded when the key is loaded.
pub fn usekey_command(config_path: &Path, key: &Path) -> Result<PathBuf> {
    let mut user = load_user_config(config_path)?;
    user.default_key = Some(key.to_path_buf());

    config::save_config(config_path, &user)
        .with_context(|| format!("Failed to save config file {:?}", config_path))?;

    print_success(&format!(
        "Default key set to {} in {}",
        key.display(),
        config_path.display()
    ));
    Ok(config_path.to_path_buf())
}
