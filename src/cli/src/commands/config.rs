//! Configuration management commands.
//!
//! The default configuration file lives at `~/.staffgate/config.toml`.

use anyhow::{Context, Result};
use clap::Subcommand;
use staffgate_core::config::Config;
use std::path::Path;

use super::{default_config_path, load_config, resolve_config_path};
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (file plus environment)
    Show,

    /// Print which configuration file is in use
    Path,

    /// Write a configuration file populated with defaults
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

/// Effective configuration with the database password masked.
fn masked(mut config: Config) -> Config {
    config.database.url = config.database.masked_url();
    config
}

pub fn execute(cmd: ConfigCommands, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let config = masked(load_config(config_path)?);

            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    output::print_detail("environment", &config.environment);
                    output::print_detail("database.url", &config.database.url);
                    output::print_detail(
                        "database.max_connections",
                        &config.database.max_connections.to_string(),
                    );
                    output::print_detail(
                        "access.cache_ttl",
                        &format_duration(config.access.cache_ttl),
                    );
                    output::print_detail(
                        "access.resolver_timeout",
                        &format_duration(config.access.resolver_timeout),
                    );
                    output::print_detail(
                        "access.role_overrides",
                        &config.access.role_overrides.len().to_string(),
                    );
                    output::print_detail(
                        "access.user_overrides",
                        &config.access.user_overrides.len().to_string(),
                    );
                    let families: Vec<&str> = config
                        .access
                        .schema
                        .families
                        .iter()
                        .map(|f| f.resource_type.as_str())
                        .collect();
                    output::print_detail("access.schema.families", &families.join(", "));
                    output::print_detail("logging.level", &config.logging.level);
                }
                _ => output::print_item(&config, format)?,
            }
        }

        ConfigCommands::Path => match resolve_config_path(config_path)? {
            Some(path) => println!("{}", path.display()),
            None => output::print_info("No configuration file; using environment and defaults"),
        },

        ConfigCommands::Init { force } => {
            let path = match config_path {
                Some(path) => path.to_path_buf(),
                None => default_config_path()?,
            };

            if path.exists() && !force {
                output::print_info(&format!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                ));
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let content =
                toml::to_string_pretty(&Config::default()).context("Failed to serialize config")?;
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;

            output::print_success(&format!("Wrote {}", path.display()));
        }
    }

    Ok(())
}

fn format_duration(duration: std::time::Duration) -> String {
    format!("{:?}", duration)
}
