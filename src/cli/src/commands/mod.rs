//! Subcommand implementations.

pub mod authorize;
pub mod check;
pub mod config;
pub mod roles;

use anyhow::{Context, Result};
use staffgate_core::config::Config;
use std::path::{Path, PathBuf};

/// Default configuration file (`~/.staffgate/config.toml`).
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".staffgate").join("config.toml"))
}

/// The file to read: the explicit path, else the default path if it exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }
    let default = default_config_path()?;
    Ok(default.exists().then_some(default))
}

/// Load the effective configuration: file (if any) under `STAFFGATE__*` variables.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = match resolve_config_path(explicit)? {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load().context("Failed to load configuration from environment")?,
    };
    Ok(config)
}
