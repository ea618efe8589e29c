//! UI-guard facade over the permission cache.
//!
//! Answers the cheap questions a front end asks before rendering ("may this
//! user see the edit button?") from cached data. It never replaces the
//! server-side [`PermissionGuard`] check: an `own` grant is reported as
//! "can" here even though ownership is only proven by the guard.

use std::sync::Arc;

use super::PermissionCache;
use crate::config::AccessConfig;
use crate::db::AccessStore;
use crate::error::Result;
use crate::rbac::guard::{PermissionGuard, PermissionOverride};
use crate::rbac::models::{AuthenticatedUser, Permission, PermissionSet, Scope, UserId};
use crate::rbac::roles::RoleTable;

/// Session-scoped permission lookups backed by a [`PermissionCache`].
#[derive(Debug, Clone)]
pub struct SessionPermissions {
    cache: Arc<PermissionCache>,
    guard: Arc<PermissionGuard>,
}

impl SessionPermissions {
    pub fn new(cache: Arc<PermissionCache>, guard: Arc<PermissionGuard>) -> Self {
        Self { cache, guard }
    }

    /// Guard and cache built from the same access settings.
    pub fn from_config(access: &AccessConfig, store: Arc<dyn AccessStore>) -> Result<Self> {
        let guard = PermissionGuard::from_config(access, store)?;
        Ok(Self::new(
            Arc::new(PermissionCache::from_config(access)),
            Arc::new(guard),
        ))
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Cached permissions for `user`, re-resolved on a miss or when the
    /// user's role or company no longer matches the cached entry.
    pub fn permissions_for(&self, user: &AuthenticatedUser) -> PermissionSet {
        if let Some(entry) = self.cache.get(&user.id) {
            if entry.role == user.role && entry.company_id == user.company_id {
                return entry.permissions;
            }
        }

        let permissions = self.guard.effective_permissions(user);
        self.cache.set(
            user.id.clone(),
            user.role.clone(),
            user.company_id.clone(),
            permissions.clone(),
        );
        permissions
    }

    /// Whether the user holds the permission at any scope that could apply.
    pub fn can(&self, user: Option<&AuthenticatedUser>, permission: &str) -> bool {
        let (Some(user), Some(required)) = (user, Permission::parse(permission)) else {
            return false;
        };

        let granted = self.permissions_for(user);
        granted.grants(&required.resource, &required.action, Scope::All)
            || granted.grants(&required.resource, &required.action, Scope::Own)
    }

    /// Whether the user's role ranks at least as high as `role`.
    pub fn is_at_least(&self, user: Option<&AuthenticatedUser>, role: &str) -> bool {
        user.is_some_and(|u| self.guard.roles().dominates(&u.role, role))
    }

    /// End of session: forget this user's cached permissions.
    pub fn logout(&self, user_id: &UserId) -> bool {
        self.cache.invalidate(user_id)
    }

    /// Replace the user's override and drop their cached set.
    pub fn set_override(&self, user_id: UserId, adjustment: PermissionOverride) {
        self.cache.invalidate(&user_id);
        self.guard.set_override(user_id, adjustment);
    }

    /// Remove the user's override and drop their cached set.
    pub fn clear_override(&self, user_id: &UserId) -> bool {
        let cleared = self.guard.clear_override(user_id);
        self.cache.invalidate(user_id);
        cleared
    }

    /// Install a new role table and drop every cached entry built from the old one.
    pub fn reload_roles(&self, table: Arc<RoleTable>) {
        self.guard.reload_roles(table);
        self.cache.invalidate_all();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryAccessStore;
    use crate::rbac::resolver::ResolverRegistry;
    use std::time::Duration;

    fn session() -> SessionPermissions {
        let guard = PermissionGuard::new(Arc::new(RoleTable::with_defaults()), ResolverRegistry::new());
        SessionPermissions::new(
            Arc::new(PermissionCache::new(Duration::from_secs(60))),
            Arc::new(guard),
        )
    }

    #[test]
    fn test_permissions_for_populates_cache() {
        let session = session();
        let user = AuthenticatedUser::new("u1", "manager");

        let first = session.permissions_for(&user);
        assert!(first.contains(&Permission::own("booking", "read")));
        assert_eq!(session.cache().len(), 1);

        let second = session.permissions_for(&user);
        assert_eq!(first, second);
        assert_eq!(session.cache().stats().hits, 1);
    }

    #[test]
    fn test_role_change_re_resolves() {
        let session = session();
        let before = AuthenticatedUser::new("u1", "user");
        assert!(!session.can(Some(&before), "booking:delete:all"));

        let promoted = AuthenticatedUser::new("u1", "admin");
        assert!(session.can(Some(&promoted), "booking:delete:all"));
        assert_eq!(session.cache().get(&promoted.id).unwrap().role, "admin");
    }

    #[test]
    fn test_can_accepts_own_grant() {
        let session = session();
        let manager = AuthenticatedUser::new("u1", "manager");
        assert!(session.can(Some(&manager), "booking:read:all"));
        assert!(!session.can(Some(&manager), "booking:delete:own"));
        assert!(!session.can(None, "booking:read:own"));
        assert!(!session.can(Some(&manager), "booking"));
    }

    #[test]
    fn test_is_at_least() {
        let session = session();
        let manager = AuthenticatedUser::new("u1", "manager");
        assert!(session.is_at_least(Some(&manager), "provider"));
        assert!(session.is_at_least(Some(&manager), "manager"));
        assert!(!session.is_at_least(Some(&manager), "admin"));
        assert!(!session.is_at_least(None, "user"));
    }

    #[test]
    fn test_logout_and_reload() {
        let session = session();
        let user = AuthenticatedUser::new("u1", "user");
        session.permissions_for(&user);
        assert!(session.logout(&user.id));
        assert!(session.cache().is_empty());

        session.permissions_for(&user);
        session.reload_roles(Arc::new(RoleTable::new()));
        assert!(session.cache().is_empty());
        assert!(session.permissions_for(&user).is_empty());
    }

    #[test]
    fn test_override_changes_reach_cached_sessions() {
        let session = session();
        let user = AuthenticatedUser::new("u1", "user");
        assert!(!session.can(Some(&user), "contract:read:all"));

        session.set_override(
            user.id.clone(),
            PermissionOverride::default().grant(Permission::all("contract", "read")),
        );
        assert!(session.can(Some(&user), "contract:read:all"));

        assert!(session.clear_override(&user.id));
        assert!(!session.can(Some(&user), "contract:read:all"));
        assert!(!session.clear_override(&user.id));
    }

    #[test]
    fn test_from_config_uses_cache_ttl() {
        let access = AccessConfig {
            cache_ttl: Duration::from_secs(600),
            ..Default::default()
        };
        let session =
            SessionPermissions::from_config(&access, Arc::new(MemoryAccessStore::new())).unwrap();
        assert_eq!(session.cache().ttl(), Duration::from_secs(600));
    }
}
