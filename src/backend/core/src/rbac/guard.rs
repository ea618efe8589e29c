//! The permission guard: the single place an allow/deny verdict is produced.
//!
//! The guard answers "can this user perform `resource:action:scope` on the
//! resource this request names?" by combining:
//! - the role's base grants from the [`RoleTable`]
//! - per-user explicit overrides (extra grants, revocations)
//! - the [`ContextResolver`] for the resource type, when only an `own` grant applies
//!
//! Evaluation order:
//! 1. No user → deny (`denied_no_session`), before anything else.
//! 2. Unparseable permission string → deny.
//! 3. An `all` grant for the resource and action → allow without touching the store.
//! 4. An `own` grant → allow only if the resolver proves ownership or membership.
//! 5. Otherwise → deny (`denied_role_lacks_permission`).
//!
//! [`ContextResolver`]: super::resolver::ContextResolver

use dashmap::DashMap;
use metrics::counter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::context::{PermissionContext, RequestContext};
use super::models::{AuthenticatedUser, Permission, PermissionSet, Scope, UserId};
use super::resolver::ResolverRegistry;
use super::roles::RoleTable;
use crate::config::AccessConfig;
use crate::db::AccessStore;
use crate::error::{AuthzError, Result};
use crate::telemetry::names;

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a decision came out the way it did. Internal only; clients see a
/// single undifferentiated deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    DeniedNoSession,
    DeniedInvalidPermission,
    DeniedRoleLacksPermission,
    DeniedOwnershipMismatch,
    AllowedWildcardScope,
    AllowedOwnershipMatch,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeniedNoSession => "denied_no_session",
            Self::DeniedInvalidPermission => "denied_invalid_permission",
            Self::DeniedRoleLacksPermission => "denied_role_lacks_permission",
            Self::DeniedOwnershipMismatch => "denied_ownership_mismatch",
            Self::AllowedWildcardScope => "allowed_wildcard_scope",
            Self::AllowedOwnershipMatch => "allowed_ownership_match",
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::AllowedWildcardScope | Self::AllowedOwnershipMatch)
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl AccessDecision {
    fn from_reason(reason: DecisionReason) -> Self {
        Self {
            allowed: reason.is_allowed(),
            reason,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    pub fn reason(&self) -> DecisionReason {
        self.reason
    }

    /// `Ok(())` on allow; the uniform access-denied error otherwise.
    pub fn into_result(self) -> Result<()> {
        if self.allowed {
            Ok(())
        } else {
            Err(AuthzError::access_denied(self.reason.as_str()))
        }
    }
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.allowed { "allow" } else { "deny" };
        write!(f, "{} ({})", verdict, self.reason)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Overrides
// ═══════════════════════════════════════════════════════════════════════════════

/// Explicit per-user adjustments on top of the role's grants. Revocations win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverride {
    #[serde(default)]
    pub grant: Vec<Permission>,
    #[serde(default)]
    pub revoke: Vec<Permission>,
}

impl PermissionOverride {
    pub fn grant(mut self, permission: Permission) -> Self {
        self.grant.push(permission);
        self
    }

    pub fn revoke(mut self, permission: Permission) -> Self {
        self.revoke.push(permission);
        self
    }

    /// Apply to a base set: add grants, then remove revocations.
    pub fn apply(&self, base: &mut PermissionSet) {
        base.extend(self.grant.iter().cloned());
        for permission in &self.revoke {
            base.remove(permission);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Guard
// ═══════════════════════════════════════════════════════════════════════════════

/// Evaluates access checks. Cheap to share behind an `Arc`; holds no
/// per-request state.
pub struct PermissionGuard {
    roles: RwLock<Arc<RoleTable>>,
    resolvers: ResolverRegistry,
    overrides: DashMap<UserId, PermissionOverride>,
}

impl PermissionGuard {
    pub fn new(roles: Arc<RoleTable>, resolvers: ResolverRegistry) -> Self {
        Self {
            roles: RwLock::new(roles),
            resolvers,
            overrides: DashMap::new(),
        }
    }

    /// Build the role table, resolvers, and overrides from configuration.
    pub fn from_config(access: &AccessConfig, store: Arc<dyn AccessStore>) -> Result<Self> {
        let roles = RoleTable::from_config(&access.role_overrides)?;
        let resolvers =
            ResolverRegistry::from_schema(&access.schema, store, access.resolver_timeout)?;

        let guard = Self::new(Arc::new(roles), resolvers);
        for (user_id, adjustment) in &access.user_overrides {
            guard.set_override(UserId::new(user_id.as_str()), adjustment.clone());
        }
        Ok(guard)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Role table and overrides
    // ─────────────────────────────────────────────────────────────────────────

    pub fn roles(&self) -> Arc<RoleTable> {
        self.roles.read().clone()
    }

    /// Swap in a new role table. Callers holding a permission cache should
    /// invalidate it wholesale afterwards.
    pub fn reload_roles(&self, table: Arc<RoleTable>) {
        debug!(roles = table.len(), "Reloading role table");
        *self.roles.write() = table;
    }

    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    /// Replace the user's override. Sets already cached for this user are
    /// stale until invalidated; [`SessionPermissions::set_override`] does both.
    ///
    /// [`SessionPermissions::set_override`]: crate::cache::SessionPermissions::set_override
    pub fn set_override(&self, user_id: UserId, adjustment: PermissionOverride) {
        self.overrides.insert(user_id, adjustment);
    }

    /// Drop the user's override. Same caching caveat as [`Self::set_override`].
    pub fn clear_override(&self, user_id: &UserId) -> bool {
        self.overrides.remove(user_id).is_some()
    }

    /// Role grants plus this user's overrides.
    pub fn effective_permissions(&self, user: &AuthenticatedUser) -> PermissionSet {
        let mut permissions = self.roles().permissions(&user.role);
        if let Some(adjustment) = self.overrides.get(&user.id) {
            adjustment.apply(&mut permissions);
        }
        permissions
    }

    /// Whether the verdict for `user` on `permission` hinges on a resolver,
    /// i.e. the permission parses and only an `own` grant covers it.
    pub fn requires_ownership_check(&self, user: &AuthenticatedUser, permission: &str) -> bool {
        let Some(required) = Permission::parse(permission) else {
            return false;
        };
        let granted = self.effective_permissions(user);
        !granted.grants(&required.resource, &required.action, Scope::All)
            && granted.grants(&required.resource, &required.action, Scope::Own)
    }

    /// Role-only check: does the role hold exactly this permission string?
    pub fn has_permission(&self, role: &str, permission: &str) -> bool {
        Permission::parse(permission)
            .is_some_and(|p| self.roles().has_permission(role, &p))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization checks
    // ─────────────────────────────────────────────────────────────────────────

    /// Decide whether `user` may exercise `permission` on the resource named
    /// by `request`. Never fails; every uncertainty is a deny.
    pub async fn authorize(
        &self,
        user: Option<&AuthenticatedUser>,
        permission: &str,
        request: &RequestContext,
    ) -> AccessDecision {
        let Some(user) = user else {
            debug!(permission, "No session");
            return self.finish(None, permission, DecisionReason::DeniedNoSession);
        };

        let Some(required) = Permission::parse(permission) else {
            warn!(user_id = %user.id, permission, "Malformed permission string");
            return self.finish(Some(user), permission, DecisionReason::DeniedInvalidPermission);
        };

        let granted = self.effective_permissions(user);

        if granted.grants(&required.resource, &required.action, Scope::All) {
            return self.finish(Some(user), permission, DecisionReason::AllowedWildcardScope);
        }

        if !granted.grants(&required.resource, &required.action, Scope::Own) {
            return self.finish(Some(user), permission, DecisionReason::DeniedRoleLacksPermission);
        }

        let Some(resolver) = self.resolvers.get(&required.resource) else {
            warn!(
                resource_type = %required.resource,
                "No context resolver registered; denying own-scoped access"
            );
            return self.finish(Some(user), permission, DecisionReason::DeniedOwnershipMismatch);
        };

        let ctx = PermissionContext::new(user, required, request);
        let reason = if resolver.resolve(&ctx).await {
            DecisionReason::AllowedOwnershipMatch
        } else {
            DecisionReason::DeniedOwnershipMismatch
        };
        self.finish(Some(user), permission, reason)
    }

    /// Allow only if every permission is allowed; returns the first deny.
    pub async fn authorize_all(
        &self,
        user: Option<&AuthenticatedUser>,
        permissions: &[&str],
        request: &RequestContext,
    ) -> AccessDecision {
        let mut last = AccessDecision::from_reason(DecisionReason::DeniedRoleLacksPermission);
        for permission in permissions {
            last = self.authorize(user, permission, request).await;
            if last.is_denied() {
                return last;
            }
        }
        last
    }

    /// Allow if any permission is allowed; otherwise returns the last deny.
    pub async fn authorize_any(
        &self,
        user: Option<&AuthenticatedUser>,
        permissions: &[&str],
        request: &RequestContext,
    ) -> AccessDecision {
        let mut last = AccessDecision::from_reason(DecisionReason::DeniedRoleLacksPermission);
        for permission in permissions {
            last = self.authorize(user, permission, request).await;
            if last.is_allowed() {
                return last;
            }
        }
        if user.is_none() {
            return AccessDecision::from_reason(DecisionReason::DeniedNoSession);
        }
        last
    }

    /// Convenience: `Ok(())` if allowed, the uniform access-denied error otherwise.
    pub async fn enforce(
        &self,
        user: Option<&AuthenticatedUser>,
        permission: &str,
        request: &RequestContext,
    ) -> Result<()> {
        self.authorize(user, permission, request).await.into_result()
    }

    fn finish(
        &self,
        user: Option<&AuthenticatedUser>,
        permission: &str,
        reason: DecisionReason,
    ) -> AccessDecision {
        counter!(names::AUTHZ_DECISIONS_TOTAL, "reason" => reason.as_str()).increment(1);

        let user_id = user.map(|u| u.id.as_str()).unwrap_or("-");
        match reason {
            DecisionReason::DeniedNoSession => {}
            r if r.is_allowed() => {
                debug!(user_id, permission, reason = %r, "Access granted");
            }
            r => {
                warn!(user_id, permission, reason = %r, "Access denied");
            }
        }

        AccessDecision::from_reason(reason)
    }
}

impl fmt::Debug for PermissionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGuard")
            .field("roles", &self.roles().len())
            .field("resolvers", &self.resolvers)
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
