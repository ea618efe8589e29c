//! Staffgate CLI - inspect role tables and run access checks.
//!
//! Provides commands for listing roles, role-only permission checks, full
//! guard evaluation against the database, and configuration management.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{authorize, check, config, roles};
use output::OutputFormat;

/// Staffgate - access control for multi-tenant workforce data
#[derive(Parser)]
#[command(
    name = "staffgate",
    version,
    about = "Staffgate - role and ownership based access control",
    long_about = "CLI tool for inspecting Staffgate role tables and evaluating access decisions.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Configuration file (defaults to ~/.staffgate/config.toml when present)
    #[arg(short, long, global = true, env = "STAFFGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List roles and their permissions
    Roles(roles::RolesArgs),

    /// Evaluate a permission against a role's grants only
    Check(check::CheckArgs),

    /// Run the full guard, including ownership lookups
    Authorize(authorize::AuthorizeArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli.output;
    let config_path = cli.config.as_deref();

    // 2 = the access check ran and denied.
    let mut exit_code = 0;

    let result = match cli.command {
        Commands::Roles(args) => roles::execute(args, config_path, format),
        Commands::Check(args) => check::execute(args, config_path, format),
        Commands::Authorize(args) => authorize::execute(args, config_path, format)
            .await
            .map(|allowed| {
                if !allowed {
                    exit_code = 2;
                }
            }),
        Commands::Config(cmd) => config::execute(cmd, config_path, format),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
