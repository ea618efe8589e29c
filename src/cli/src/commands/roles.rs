//! Role table listing.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use staffgate_core::rbac::{Role, RoleTable};
use std::path::Path;
use tabled::Tabled;

use super::load_config;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct RolesArgs {
    /// Show the permissions of a single role
    #[arg(short, long)]
    role: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct RoleRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Rank")]
    rank: String,
    #[tabled(rename = "Permissions")]
    permissions: usize,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Debug, Serialize, Tabled)]
struct PermissionRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Scope")]
    scope: String,
}

pub fn execute(args: RolesArgs, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let table = RoleTable::from_config(&config.access.role_overrides)?;

    match args.role {
        Some(role) => show_role(&table, &role, format),
        None => list_roles(&table, format),
    }
}

fn list_roles(table: &RoleTable, format: OutputFormat) -> Result<()> {
    let rows: Vec<RoleRow> = table
        .role_tags()
        .into_iter()
        .map(|tag| {
            let builtin = Role::parse(&tag);
            RoleRow {
                rank: builtin
                    .map(|r| r.rank().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                permissions: table.permissions(&tag).len(),
                description: builtin
                    .map(|r| r.description().to_string())
                    .unwrap_or_else(|| "Custom role".to_string()),
                role: tag,
            }
        })
        .collect();

    output::print_list(&rows, format)
}

fn show_role(table: &RoleTable, role: &str, format: OutputFormat) -> Result<()> {
    if !table.contains_role(role) {
        bail!("Unknown role '{}'", role);
    }

    let mut rows: Vec<PermissionRow> = table
        .permissions(role)
        .iter()
        .map(|p| PermissionRow {
            resource: p.resource.clone(),
            action: p.action.clone(),
            scope: p.scope.to_string(),
        })
        .collect();
    rows.sort_by(|a, b| (&a.resource, &a.action, &a.scope).cmp(&(&b.resource, &b.action, &b.scope)));

    if let OutputFormat::Table = format {
        output::print_header(&format!("Role: {}", role));
    }
    output::print_list(&rows, format)
}
