//! Built-in roles, their hierarchy, and the role → permission table.
//!
//! Staffgate ships with five built-in roles, highest first:
//!
//! | Role         | Rank | Description                                                 |
//! |--------------|------|-------------------------------------------------------------|
//! | SuperAdmin   | 4    | Platform operator; every permission at `all` scope           |
//! | Admin        | 3    | Back-office staff; bookings, contracts, timesheets at `all`  |
//! | Manager      | 2    | Company manager; own-scoped access through their companies   |
//! | Provider     | 1    | Service provider; works own bookings and timesheets          |
//! | User         | 0    | Client account; creates and reads own bookings               |
//!
//! Role tags coming from session claims are free-form strings. A tag the
//! table does not know maps to the empty permission set, never to an error.

use std::collections::HashMap;

use tracing::debug;

use super::models::{Permission, PermissionSet};
use crate::error::{AuthzError, Result};

/// Resource types and the actions defined on each.
const CATALOG: &[(&str, &[&str])] = &[
    ("booking", &["create", "read", "update", "delete"]),
    ("company", &["create", "read", "update", "delete"]),
    ("contract", &["create", "read", "update", "delete", "approve"]),
    ("timesheet", &["create", "read", "update", "delete", "approve"]),
    ("user", &["create", "read", "update", "delete"]),
];

/// Normalize a role tag: trimmed, lowercase, `-` and spaces folded to `_`.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// Built-in role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    SuperAdmin,
    Admin,
    Manager,
    Provider,
    User,
}

impl Role {
    /// Get the role tag.
    pub fn id(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Provider => "provider",
            Self::User => "user",
        }
    }

    /// Get the human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super Admin",
            Self::Admin => "Admin",
            Self::Manager => "Manager",
            Self::Provider => "Provider",
            Self::User => "User",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Platform operator with every permission",
            Self::Admin => "Manage bookings, contracts, and timesheets across companies",
            Self::Manager => "Manage bookings and timesheets of their own companies",
            Self::Provider => "Work on their own bookings and timesheets",
            Self::User => "Create and follow their own bookings",
        }
    }

    /// Position in the hierarchy; higher is more privileged.
    pub fn rank(&self) -> u8 {
        match self {
            Self::SuperAdmin => 4,
            Self::Admin => 3,
            Self::Manager => 2,
            Self::Provider => 1,
            Self::User => 0,
        }
    }

    /// Parse a role tag, accepting case and separator variants
    /// (`"Super Admin"`, `"super-admin"`).
    pub fn parse(tag: &str) -> Option<Self> {
        match normalize_tag(tag).as_str() {
            "super_admin" | "superadmin" => Some(Self::SuperAdmin),
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "provider" => Some(Self::Provider),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    /// Whether this role is at least as privileged as `other`.
    pub fn dominates(&self, other: &Role) -> bool {
        self.rank() >= other.rank()
    }

    /// Default permission set for this role.
    pub fn permissions(&self) -> PermissionSet {
        match self {
            Self::SuperAdmin => CATALOG
                .iter()
                .flat_map(|(resource, actions)| {
                    actions.iter().map(move |action| Permission::all(*resource, *action))
                })
                .collect(),
            Self::Admin => {
                let mut perms = PermissionSet::new();
                for action in ["create", "read", "update", "delete"] {
                    perms.insert(Permission::all("booking", action));
                }
                for action in ["create", "read", "update", "delete", "approve"] {
                    perms.insert(Permission::all("contract", action));
                }
                for action in ["read", "update", "approve"] {
                    perms.insert(Permission::all("timesheet", action));
                }
                perms.insert(Permission::all("user", "read"));
                // Company settings only for companies the admin belongs to
                perms.insert(Permission::own("company", "read"));
                perms.insert(Permission::own("company", "update"));
                perms
            }
            Self::Manager => [
                Permission::own("booking", "read"),
                Permission::own("booking", "update"),
                Permission::own("contract", "read"),
                Permission::own("timesheet", "read"),
                Permission::own("timesheet", "approve"),
                Permission::own("company", "read"),
            ]
            .into_iter()
            .collect(),
            Self::Provider => [
                Permission::own("booking", "read"),
                Permission::own("booking", "update"),
                Permission::own("contract", "read"),
                Permission::own("timesheet", "create"),
                Permission::own("timesheet", "read"),
                Permission::own("timesheet", "update"),
                Permission::own("company", "read"),
            ]
            .into_iter()
            .collect(),
            Self::User => [
                Permission::own("booking", "create"),
                Permission::own("booking", "read"),
                Permission::own("user", "read"),
                Permission::own("user", "update"),
            ]
            .into_iter()
            .collect(),
        }
    }

    /// All built-in roles, highest first.
    pub fn all() -> Vec<Role> {
        vec![
            Self::SuperAdmin,
            Self::Admin,
            Self::Manager,
            Self::Provider,
            Self::User,
        ]
    }
}

/// Hierarchy comparison over raw tags.
///
/// Reflexive. Unknown tags rank below every built-in role and dominate only
/// themselves.
pub fn dominates(a: &str, b: &str) -> bool {
    if normalize_tag(a) == normalize_tag(b) {
        return true;
    }
    match (Role::parse(a), Role::parse(b)) {
        (Some(ra), Some(rb)) => ra.dominates(&rb),
        (Some(_), None) => true,
        (None, _) => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Table
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable mapping from role tag to permission set.
///
/// Built once at startup (defaults plus configured overrides) and shared
/// behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    roles: HashMap<String, PermissionSet>,
}

impl RoleTable {
    /// An empty table; every lookup yields the empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in roles with their default grants.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for role in Role::all() {
            table.set_role(role.id(), role.permissions());
        }
        table
    }

    /// Defaults with configured overrides applied.
    ///
    /// Each override replaces the named role's set outright, or defines a new
    /// role. Every permission string must parse; a malformed entry fails the
    /// whole table so the problem surfaces at startup.
    pub fn from_config(overrides: &HashMap<String, Vec<String>>) -> Result<Self> {
        let mut table = Self::with_defaults();

        for (tag, permissions) in overrides {
            if normalize_tag(tag).is_empty() {
                return Err(AuthzError::invalid_role_table(tag, "empty role tag"));
            }

            let mut set = PermissionSet::new();
            for raw in permissions {
                let permission = Permission::parse(raw).ok_or_else(|| {
                    AuthzError::invalid_role_table(
                        tag,
                        format!("malformed permission {:?}", raw),
                    )
                })?;
                set.insert(permission);
            }

            debug!(role = %tag, permissions = set.len(), "Applying role override");
            table.set_role(tag, set);
        }

        Ok(table)
    }

    /// Insert or replace a role's permission set.
    pub fn set_role(&mut self, tag: &str, permissions: PermissionSet) {
        self.roles.insert(normalize_tag(tag), permissions);
    }

    /// Permission set of a role; unknown roles get the empty set.
    pub fn permissions(&self, tag: &str) -> PermissionSet {
        self.roles
            .get(&normalize_tag(tag))
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the role holds exactly this permission.
    pub fn has_permission(&self, tag: &str, permission: &Permission) -> bool {
        self.roles
            .get(&normalize_tag(tag))
            .is_some_and(|set| set.contains(permission))
    }

    pub fn contains_role(&self, tag: &str) -> bool {
        self.roles.contains_key(&normalize_tag(tag))
    }

    /// Role tags ordered by hierarchy (highest first), custom roles last in
    /// alphabetical order.
    pub fn role_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.roles.keys().cloned().collect();
        tags.sort_by(|a, b| {
            let ra = Role::parse(a).map(|r| r.rank());
            let rb = Role::parse(b).map(|r| r.rank());
            rb.cmp(&ra).then_with(|| a.cmp(b))
        });
        tags
    }

    pub fn dominates(&self, a: &str, b: &str) -> bool {
        dominates(a, b)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
