//! Full guard evaluation against the configured database.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use staffgate_core::db::{Database, PgAccessStore};
use staffgate_core::rbac::{AuthenticatedUser, PermissionGuard, RequestContext};
use std::path::Path;
use std::sync::Arc;

use super::load_config;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct AuthorizeArgs {
    /// Acting user id
    #[arg(short, long)]
    user: String,

    /// Acting user's role tag
    #[arg(short, long)]
    role: String,

    /// Acting user's company id
    #[arg(long)]
    company: Option<String>,

    /// Permission string (resource:action:scope)
    #[arg(short, long)]
    permission: String,

    /// Resource id as a path parameter
    #[arg(long)]
    path_id: Option<String>,

    /// Resource id as a body field
    #[arg(long)]
    body_id: Option<String>,

    /// Resource id as a query parameter
    #[arg(long)]
    query_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthorizeResult {
    user: String,
    role: String,
    permission: String,
    resource_id: Option<String>,
    allowed: bool,
    reason: &'static str,
}

fn request_context(args: &AuthorizeArgs) -> RequestContext {
    RequestContext {
        path_id: args.path_id.clone(),
        body_id: args.body_id.clone(),
        query_id: args.query_id.clone(),
    }
}

/// Returns whether access was allowed.
pub async fn execute(
    args: AuthorizeArgs,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<bool> {
    let config = load_config(config_path)?;

    let database = Database::new(&config.database)
        .await
        .with_context(|| format!("Failed to connect to {}", config.database.masked_url()))?;
    let store = PgAccessStore::new(&database, config.access.schema.membership.clone())?;
    let guard = PermissionGuard::from_config(&config.access, Arc::new(store))?;

    let mut user = AuthenticatedUser::new(args.user.as_str(), args.role.as_str());
    if let Some(company) = &args.company {
        user = user.with_company(company.as_str());
    }

    let request = request_context(&args);
    let decision = guard.authorize(Some(&user), &args.permission, &request).await;

    let result = AuthorizeResult {
        user: args.user,
        role: args.role,
        permission: args.permission,
        resource_id: request.resource_id().map(|r| r.id),
        allowed: decision.is_allowed(),
        reason: decision.reason().as_str(),
    };

    match format {
        OutputFormat::Table => {
            let summary = format!("{} ({}) → {}", result.user, result.role, result.permission);
            if result.allowed {
                output::print_success(&format!("{}: allowed", summary));
            } else {
                output::print_denied(&format!("{}: denied", summary));
            }
            output::print_detail("reason", result.reason);
            if let Some(id) = &result.resource_id {
                output::print_detail("resource", id);
            }
        }
        _ => output::print_item(&result, format)?,
    }

    Ok(result.allowed)
}
