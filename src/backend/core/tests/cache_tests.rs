//! Integration tests for the permission cache and the session facade.
//!
//! Tests cover:
//! - TTL expiry driven by a manual clock
//! - Full replacement on `set`
//! - Per-user and bulk invalidation
//! - Session re-resolution after role or company changes
//! - Concurrent writers (last write wins)
//! - Cache lifetime taken from the config file

use staffgate_core::cache::{ManualClock, PermissionCache, SessionPermissions};
use staffgate_core::config::Config;
use staffgate_core::db::MemoryAccessStore;
use staffgate_core::rbac::{
    AuthenticatedUser, CompanyId, Permission, PermissionGuard, PermissionSet, ResolverRegistry,
    RoleTable, UserId,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(300);

fn cache() -> (Arc<PermissionCache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    (Arc::new(PermissionCache::with_clock(TTL, clock.clone())), clock)
}

fn session(cache: Arc<PermissionCache>) -> SessionPermissions {
    let guard = PermissionGuard::new(Arc::new(RoleTable::with_defaults()), ResolverRegistry::new());
    SessionPermissions::new(cache, Arc::new(guard))
}

fn perms(list: &[&str]) -> PermissionSet {
    list.iter().filter_map(|p| Permission::parse(p)).collect()
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn test_entry_valid_until_ttl_elapses() {
    let (cache, clock) = cache();
    let user = UserId::new("u1");
    cache.set(user.clone(), "manager", Some(CompanyId::new("acme")), perms(&["booking:read:own"]));

    clock.advance(Duration::from_secs(299));
    let entry = cache.get(&user).unwrap();
    assert_eq!(entry.company_id, Some(CompanyId::new("acme")));

    clock.advance(Duration::from_secs(2));
    assert!(cache.get(&user).is_none());
}

#[test]
fn test_expired_and_missing_look_the_same() {
    let (cache, clock) = cache();
    cache.set(UserId::new("old"), "user", None, PermissionSet::new());
    clock.advance(TTL + Duration::from_secs(1));

    assert_eq!(cache.get(&UserId::new("old")), cache.get(&UserId::new("never")));

    let stats = cache.stats();
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 0);
}

#[test]
fn test_set_after_expiry_restarts_ttl() {
    let (cache, clock) = cache();
    let user = UserId::new("u1");
    cache.set(user.clone(), "user", None, PermissionSet::new());
    clock.advance(TTL + Duration::from_secs(1));
    assert!(cache.get(&user).is_none());

    cache.set(user.clone(), "user", None, PermissionSet::new());
    assert_eq!(cache.remaining_ttl(&user), Some(TTL));
}

// ============================================================================
// Replacement and Invalidation
// ============================================================================

#[test]
fn test_demotion_does_not_leak_old_permissions() {
    let (cache, _) = cache();
    let user = UserId::new("u1");
    cache.set(user.clone(), "admin", None, perms(&["booking:delete:all", "contract:approve:all"]));
    cache.set(user.clone(), "user", None, perms(&["booking:read:own"]));

    let entry = cache.get(&user).unwrap();
    assert_eq!(entry.permissions, perms(&["booking:read:own"]));
}

#[test]
fn test_invalidate_only_touches_one_user() {
    let (cache, _) = cache();
    cache.set(UserId::new("u1"), "user", None, PermissionSet::new());
    cache.set(UserId::new("u2"), "user", None, PermissionSet::new());

    cache.invalidate(&UserId::new("u1"));

    assert!(cache.get(&UserId::new("u1")).is_none());
    assert!(cache.get(&UserId::new("u2")).is_some());
}

#[test]
fn test_purge_leaves_fresh_entries() {
    let (cache, clock) = cache();
    cache.set(UserId::new("a"), "user", None, PermissionSet::new());
    cache.set(UserId::new("b"), "user", None, PermissionSet::new());
    clock.advance(Duration::from_secs(200));
    cache.set(UserId::new("c"), "user", None, PermissionSet::new());
    clock.advance(Duration::from_secs(200));

    assert_eq!(cache.purge_expired(), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&UserId::new("c")).is_some());
}

#[test]
fn test_concurrent_sets_last_write_wins() {
    let (cache, _) = cache();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                cache.set(UserId::new("shared"), format!("role{}", i), None, PermissionSet::new());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), 1);
    assert!(cache.get(&UserId::new("shared")).unwrap().role.starts_with("role"));
}

// ============================================================================
// Session Facade
// ============================================================================

#[test]
fn test_session_hits_cache_on_repeat() {
    let (cache, _) = cache();
    let session = session(cache.clone());
    let user = AuthenticatedUser::new("u1", "provider").with_company("acme");

    assert!(session.can(Some(&user), "timesheet:create:own"));
    assert!(session.can(Some(&user), "booking:update:own"));
    assert!(!session.can(Some(&user), "contract:approve:own"));

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
}

#[test]
fn test_session_re_resolves_on_company_change() {
    let (cache, _) = cache();
    let session = session(cache.clone());

    session.permissions_for(&AuthenticatedUser::new("u1", "manager").with_company("acme"));
    session.permissions_for(&AuthenticatedUser::new("u1", "manager").with_company("globex"));

    let entry = cache.get(&UserId::new("u1")).unwrap();
    assert_eq!(entry.company_id, Some(CompanyId::new("globex")));
}

#[test]
fn test_session_re_resolves_after_expiry() {
    let (cache, clock) = cache();
    let session = session(cache.clone());
    let user = AuthenticatedUser::new("u1", "user");

    session.permissions_for(&user);
    clock.advance(TTL + Duration::from_secs(1));
    let permissions = session.permissions_for(&user);

    assert!(permissions.contains(&Permission::own("booking", "create")));
    assert_eq!(cache.stats().expirations, 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_session_reload_clears_everything() {
    let (cache, _) = cache();
    let session = session(cache.clone());
    session.permissions_for(&AuthenticatedUser::new("u1", "user"));
    session.permissions_for(&AuthenticatedUser::new("u2", "admin"));
    assert_eq!(cache.len(), 2);

    session.reload_roles(Arc::new(RoleTable::with_defaults()));

    assert!(cache.is_empty());
}

#[test]
fn test_cache_ttl_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(b"[access]\ncache_ttl = \"10m\"\n").unwrap();
    let config = Config::from_file(file.path()).unwrap();

    let session =
        SessionPermissions::from_config(&config.access, Arc::new(MemoryAccessStore::new())).unwrap();
    assert_eq!(session.cache().ttl(), Duration::from_secs(600));

    let clock = Arc::new(ManualClock::new());
    let cache = PermissionCache::with_clock(config.access.cache_ttl, clock.clone());
    let user = UserId::new("u1");
    cache.set(user.clone(), "user", None, PermissionSet::new());

    clock.advance(Duration::from_secs(9 * 60));
    assert!(cache.get(&user).is_some());
    clock.advance(Duration::from_secs(2 * 60));
    assert!(cache.get(&user).is_none());
}
