//! Per-check context: where the target resource id came from, and the bundle
//! handed to context resolvers.
//!
//! A request may name its target resource in three places. They are checked in
//! a fixed order: path parameter, body field, query field.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::models::{AuthenticatedUser, CompanyId, Permission, UserId};

/// Where a resource identifier was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceIdSource {
    Path,
    Body,
    Query,
}

impl fmt::Display for ResourceIdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Path => "path",
            Self::Body => "body",
            Self::Query => "query",
        };
        f.write_str(s)
    }
}

/// A resolved resource identifier and its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRef {
    pub id: String,
    pub source: ResourceIdSource,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Candidate resource identifiers pulled from an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub path_id: Option<String>,
    pub body_id: Option<String>,
    pub query_id: Option<String>,
}

impl RequestContext {
    /// A context with no identifiers at all.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path_id(mut self, id: impl Into<String>) -> Self {
        self.path_id = Some(id.into());
        self
    }

    pub fn with_body_id(mut self, id: impl Into<String>) -> Self {
        self.body_id = Some(id.into());
        self
    }

    pub fn with_query_id(mut self, id: impl Into<String>) -> Self {
        self.query_id = Some(id.into());
        self
    }

    /// Build a context from raw request parts, reading `field` from each.
    ///
    /// Body values may be JSON strings or numbers; anything else is ignored.
    pub fn from_sources(
        field: &str,
        path_params: &HashMap<String, String>,
        body: Option<&Value>,
        query_params: &HashMap<String, String>,
    ) -> Self {
        let body_id = body.and_then(|b| b.get(field)).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Self {
            path_id: path_params.get(field).cloned(),
            body_id,
            query_id: query_params.get(field).cloned(),
        }
    }

    /// The identifier to use: path, then body, then query.
    ///
    /// Blank values count as absent and fall through to the next source.
    pub fn resource_id(&self) -> Option<ResourceRef> {
        [
            (self.path_id.as_deref(), ResourceIdSource::Path),
            (self.body_id.as_deref(), ResourceIdSource::Body),
            (self.query_id.as_deref(), ResourceIdSource::Query),
        ]
        .into_iter()
        .find_map(|(value, source)| {
            let id = value?.trim();
            (!id.is_empty()).then(|| ResourceRef {
                id: id.to_string(),
                source,
            })
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a resolver needs for one access check. Built fresh per check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionContext {
    pub user_id: UserId,
    pub role: String,
    pub company_id: Option<CompanyId>,
    pub permission: Permission,
    pub resource: Option<ResourceRef>,
}

impl PermissionContext {
    pub fn new(user: &AuthenticatedUser, permission: Permission, request: &RequestContext) -> Self {
        Self {
            user_id: user.id.clone(),
            role: user.role.clone(),
            company_id: user.company_id.clone(),
            permission,
            resource: request.resource_id(),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.permission.resource
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource.as_ref().map(|r| r.id.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
