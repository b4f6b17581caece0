//! `sshtail spec init`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use dialoguer::Confirm;

use st_core::spec::{spec_template, TemplateOptions, SPEC_SUFFIX};

use crate::output::{print_info, print_success};

/// Options for creating a starter spec file
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Target file name; `.yml` is appended when missing
    pub name: String,
    pub with_comments: bool,
    pub exclude_keys: bool,
    /// Replace an existing file without asking
    pub overwrite: bool,
}

/// File name for a spec called `name`
pub fn spec_file_name(name: &str) -> String {
    format!("{}{}", name.strip_suffix(SPEC_SUFFIX).unwrap_or(name), SPEC_SUFFIX)
}

/// Write a starter spec file, returning its path
pub fn init_command(options: &InitOptions) -> Result<PathBuf> {
    let path = PathBuf::from(spec_file_name(&options.name));
    print_info(&format!("Creating template spec file '{}'", path.display()));

    let text = spec_template(TemplateOptions {
        with_comments: options.with_comments,
        exclude_keys: options.exclude_keys,
    });

    if !options.overwrite && path.exists() && !confirm_replace(&path)? {
        bail!("Canceling init operation");
    }

    std::fs::write(&path, text)
        .with_context(|| format!("Unable to write to file {}", path.display()))?;
    print_success("Spec written to file");
    Ok(path)
}

fn confirm_replace(path: &Path) -> Result<bool> {
    Confirm::new()
        .with_prompt(format!(
            "The file {} already exists, do you want to replace it?",
            path.display()
        ))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_file_name_appends_suffix() {
        assert_eq!(spec_file_name("cluster"), "cluster.yml");
        assert_eq!(spec_file_name("cluster.yml"), "cluster.yml");
        assert_eq!(spec_file_name("logs/web"), "logs/web.yml");
    }
}
