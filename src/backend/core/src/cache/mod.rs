//! Per-session permission cache.
//!
//! Holds the resolved role and permission set for each user, keyed by user
//! id, so that UI guards and route protection do not rebuild them on every
//! check. Entries expire after a fixed TTL; expiry is checked lazily on
//! [`PermissionCache::get`] and there is no background eviction.
//!
//! The cache is never an authority. A miss, for whatever reason, means
//! "re-resolve and [`PermissionCache::set`] again".
//!
//! # Usage
//!
//! ```rust,ignore
//! use staffgate_core::cache::PermissionCache;
//!
//! let cache = PermissionCache::new(Duration::from_secs(300));
//! cache.set(user.id.clone(), &user.role, user.company_id.clone(), permissions);
//!
//! if let Some(entry) = cache.get(&user.id) {
//!     // entry.permissions ...
//! }
//!
//! cache.invalidate(&user.id); // logout, role change
//! cache.invalidate_all();     // role table reload
//! ```

pub mod session;

pub use session::SessionPermissions;

use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::AccessConfig;
use crate::rbac::models::{CompanyId, PermissionSet, UserId};
use crate::telemetry::names;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

// ═══════════════════════════════════════════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════════════════════════════════════════

/// Time source for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entries and Stats
// ═══════════════════════════════════════════════════════════════════════════════

/// One user's resolved access data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPermissions {
    pub role: String,
    pub company_id: Option<CompanyId>,
    pub permissions: PermissionSet,
    pub cached_at: Instant,
}

impl CachedPermissions {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.cached_at)
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) > ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Lookups that found an entry past its TTL
    pub expirations: u64,
    pub entries: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

impl CacheStats {
    fn calculate_hit_rate(&mut self) {
        let total = self.hits + self.misses + self.expirations;
        self.hit_rate = if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        };
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Cache
// ═══════════════════════════════════════════════════════════════════════════════

/// TTL cache of resolved permissions, one entry per user.
pub struct PermissionCache {
    entries: DashMap<UserId, CachedPermissions>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Cache whose entries live for `access.cache_ttl`.
    pub fn from_config(access: &AccessConfig) -> Self {
        Self::new(access.cache_ttl)
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The user's entry, or `None` if missing or older than the TTL.
    ///
    /// Expired entries are removed on the way out.
    pub fn get(&self, user_id: &UserId) -> Option<CachedPermissions> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(user_id) {
            if !entry.is_expired(now, self.ttl) {
                self.record(&self.hits, "hit");
                return Some(entry.clone());
            }
        } else {
            self.record(&self.misses, "miss");
            return None;
        }

        let ttl = self.ttl;
        self.entries
            .remove_if(user_id, |_, entry| entry.is_expired(now, ttl));
        self.record(&self.expirations, "expired");
        debug!(user_id = %user_id, "Permission cache entry expired");
        None
    }

    /// Store a user's entry, replacing whatever was there.
    pub fn set(
        &self,
        user_id: UserId,
        role: impl Into<String>,
        company_id: Option<CompanyId>,
        permissions: PermissionSet,
    ) {
        let entry = CachedPermissions {
            role: role.into(),
            company_id,
            permissions,
            cached_at: self.clock.now(),
        };
        self.entries.insert(user_id, entry);
    }

    /// Drop one user's entry. Returns whether one existed.
    pub fn invalidate(&self, user_id: &UserId) -> bool {
        let removed = self.entries.remove(user_id).is_some();
        if removed {
            debug!(user_id = %user_id, "Permission cache entry invalidated");
        }
        removed
    }

    /// Drop every entry. Returns how many were dropped.
    pub fn invalidate_all(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        debug!(count, "Permission cache cleared");
        count
    }

    /// Remove every expired entry now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        before.saturating_sub(self.entries.len())
    }

    /// Time left before the user's entry expires.
    pub fn remaining_ttl(&self, user_id: &UserId) -> Option<Duration> {
        let now = self.clock.now();
        let entry = self.entries.get(user_id)?;
        self.ttl.checked_sub(entry.age(now))
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.entries.len() as u64,
            hit_rate: 0.0,
        };
        stats.calculate_hit_rate();
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&self, tally: &AtomicU64, outcome: &'static str) {
        tally.fetch_add(1, Ordering::Relaxed);
        counter!(names::PERMISSION_CACHE_TOTAL, "outcome" => outcome).increment(1);
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::Permission;

    fn cache() -> (PermissionCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (
            PermissionCache::with_clock(Duration::from_secs(60), clock.clone()),
            clock,
        )
    }

    fn set_of(permissions: &[Permission]) -> PermissionSet {
        permissions.iter().cloned().collect()
    }

    #[test]
    fn test_miss_then_hit() {
        let (cache, _) = cache();
        let user = UserId::new("u1");
        assert!(cache.get(&user).is_none());

        cache.set(user.clone(), "manager", None, set_of(&[Permission::own("booking", "read")]));
        let entry = cache.get(&user).unwrap();
        assert_eq!(entry.role, "manager");
        assert_eq!(entry.permissions.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_expiry_is_lazy() {
        let (cache, clock) = cache();
        let user = UserId::new("u1");
        cache.set(user.clone(), "user", None, PermissionSet::new());

        clock.advance(Duration::from_secs(60));
        assert!(cache.get(&user).is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&user).is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_set_replaces_without_merging() {
        let (cache, _) = cache();
        let user = UserId::new("u1");
        cache.set(user.clone(), "admin", None, set_of(&[Permission::all("booking", "delete")]));
        cache.set(user.clone(), "user", None, set_of(&[Permission::own("booking", "read")]));

        let entry = cache.get(&user).unwrap();
        assert_eq!(entry.role, "user");
        assert!(!entry.permissions.contains(&Permission::all("booking", "delete")));
        assert_eq!(entry.permissions.len(), 1);
    }

    #[test]
    fn test_invalidate_and_invalidate_all() {
        let (cache, _) = cache();
        cache.set(UserId::new("u1"), "user", None, PermissionSet::new());
        cache.set(UserId::new("u2"), "user", None, PermissionSet::new());

        assert!(cache.invalidate(&UserId::new("u1")));
        assert!(!cache.invalidate(&UserId::new("u1")));
        assert_eq!(cache.invalidate_all(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_and_remaining_ttl() {
        let (cache, clock) = cache();
        cache.set(UserId::new("old"), "user", None, PermissionSet::new());
        clock.advance(Duration::from_secs(45));
        cache.set(UserId::new("new"), "user", None, PermissionSet::new());

        assert_eq!(
            cache.remaining_ttl(&UserId::new("old")),
            Some(Duration::from_secs(15))
        );

        clock.advance(Duration::from_secs(30));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.remaining_ttl(&UserId::new("old")).is_none());
    }

    #[test]
    fn test_configured_ttl_controls_expiry() {
        let access = AccessConfig {
            cache_ttl: Duration::from_secs(600),
            ..Default::default()
        };
        assert_eq!(PermissionCache::from_config(&access).ttl(), Duration::from_secs(600));

        let clock = Arc::new(ManualClock::new());
        let cache = PermissionCache::with_clock(access.cache_ttl, clock.clone());
        let user = UserId::new("u1");
        cache.set(user.clone(), "user", None, PermissionSet::new());

        clock.advance(Duration::from_secs(9 * 60));
        assert!(cache.get(&user).is_some());

        clock.advance(Duration::from_secs(2 * 60));
        assert!(cache.get(&user).is_none());
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        stats.calculate_hit_rate();
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }
}
