//! Role-only permission check. No database access.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use staffgate_core::rbac::{Permission, RoleTable, Scope};
use std::path::Path;

use super::load_config;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct CheckArgs {
    /// Role tag (e.g. manager)
    #[arg(short, long)]
    role: String,

    /// Permission string (resource:action:scope)
    #[arg(short, long)]
    permission: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Verdict {
    Granted,
    OwnershipCheckRequired,
    NotGranted,
    InvalidPermission,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    role: String,
    permission: String,
    verdict: Verdict,
}

fn evaluate(table: &RoleTable, role: &str, permission: &str) -> Verdict {
    let Some(required) = Permission::parse(permission) else {
        return Verdict::InvalidPermission;
    };
    let granted = table.permissions(role);

    if granted.grants(&required.resource, &required.action, Scope::All) {
        Verdict::Granted
    } else if granted.grants(&required.resource, &required.action, Scope::Own) {
        Verdict::OwnershipCheckRequired
    } else {
        Verdict::NotGranted
    }
}

pub fn execute(args: CheckArgs, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let table = RoleTable::from_config(&config.access.role_overrides)?;

    let verdict = evaluate(&table, &args.role, &args.permission);

    match format {
        OutputFormat::Table => {
            let subject = format!("{} → {}", args.role, args.permission);
            match verdict {
                Verdict::Granted => output::print_success(&format!("{}: granted", subject)),
                Verdict::OwnershipCheckRequired => output::print_warning(&format!(
                    "{}: granted for owned or company resources only",
                    subject
                )),
                Verdict::NotGranted => output::print_denied(&format!("{}: not granted", subject)),
                Verdict::InvalidPermission => output::print_denied(&format!(
                    "{}: not a valid resource:action:scope string",
                    subject
                )),
            }
            if !table.contains_role(&args.role) {
                output::print_info(&format!("'{}' is not a known role", args.role));
            }
            Ok(())
        }
        _ => output::print_item(
            &CheckResult {
                role: args.role,
                permission: args.permission,
                verdict,
            },
            format,
        ),
    }
}
