//! Context resolvers decide ownership-based access for one resource family.
//!
//! A resolver answers a single question: does the acting user's relationship
//! to this particular resource grant access? Two relationships count:
//!
//! 1. **Direct ownership**: the resource's owner column equals the user id.
//! 2. **Company membership**: the user holds an *active* membership in the
//!    company the resource belongs to.
//!
//! Resolvers never fail. A missing identifier, a missing row, a store error,
//! or a timeout all resolve to `false`.

use async_trait::async_trait;
use metrics::counter;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::context::PermissionContext;
use crate::db::{AccessSchema, AccessStore, ResourceFamily};
use crate::error::{AuthzError, Result};
use crate::telemetry::names;

/// Ownership decision for one resource type.
#[async_trait]
pub trait ContextResolver: Send + Sync {
    /// Resource tag this resolver handles (e.g. "booking").
    fn resource_type(&self) -> &str;

    /// `true` only when the user's relationship to the resource is proven.
    async fn resolve(&self, ctx: &PermissionContext) -> bool;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ownership Resolver
// ═══════════════════════════════════════════════════════════════════════════════

/// Store-backed resolver for a [`ResourceFamily`].
///
/// Issues at most two reads per call: the resource lookup, then a membership
/// lookup only if ownership did not already match.
pub struct OwnershipResolver {
    family: ResourceFamily,
    store: Arc<dyn AccessStore>,
    timeout: Duration,
}

impl OwnershipResolver {
    pub fn new(family: ResourceFamily, store: Arc<dyn AccessStore>, timeout: Duration) -> Self {
        Self {
            family,
            store,
            timeout,
        }
    }

    pub fn family(&self) -> &ResourceFamily {
        &self.family
    }

    /// Run a store call under the timeout; any failure becomes `None`.
    async fn guarded<T, F>(&self, operation: &'static str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) => {
                warn!(
                    resource_type = %self.family.resource_type,
                    operation,
                    error = %error,
                    "Store lookup failed; denying"
                );
                None
            }
            Err(_) => {
                let error = AuthzError::store_timeout(operation, self.timeout.as_millis());
                warn!(
                    resource_type = %self.family.resource_type,
                    operation,
                    error = %error,
                    "Store lookup timed out; denying"
                );
                None
            }
        }
    }

    fn record(&self, outcome: &'static str) {
        counter!(
            names::RESOLVER_LOOKUPS_TOTAL,
            "resource_type" => self.family.resource_type.clone(),
            "outcome" => outcome,
        )
        .increment(1);
    }
}

#[async_trait]
impl ContextResolver for OwnershipResolver {
    fn resource_type(&self) -> &str {
        &self.family.resource_type
    }

    async fn resolve(&self, ctx: &PermissionContext) -> bool {
        let Some(resource_id) = ctx.resource_id() else {
            debug!(resource_type = %self.family.resource_type, "No resource id in request");
            self.record("missing_id");
            return false;
        };

        let linkage = match self
            .guarded(
                "resource_linkage",
                self.store.resource_linkage(&self.family, resource_id),
            )
            .await
        {
            Some(Some(linkage)) => linkage,
            Some(None) => {
                debug!(
                    resource_type = %self.family.resource_type,
                    resource_id,
                    "Resource not found"
                );
                self.record("not_found");
                return false;
            }
            None => {
                self.record("store_error");
                return false;
            }
        };

        if linkage.owner_id.as_ref() == Some(&ctx.user_id) {
            self.record("owner_match");
            return true;
        }

        let Some(company_id) = linkage.company_id else {
            self.record("mismatch");
            return false;
        };

        match self
            .guarded(
                "active_membership",
                self.store.has_active_membership(&ctx.user_id, &company_id),
            )
            .await
        {
            Some(true) => {
                debug!(
                    user_id = %ctx.user_id,
                    company_id = %company_id,
                    "Access through active company membership"
                );
                self.record("membership_match");
                true
            }
            Some(false) => {
                self.record("mismatch");
                false
            }
            None => {
                self.record("store_error");
                false
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Resource tag → resolver mapping consulted by the guard.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn ContextResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`OwnershipResolver`] per family in the schema.
    pub fn from_schema(
        schema: &AccessSchema,
        store: Arc<dyn AccessStore>,
        timeout: Duration,
    ) -> Result<Self> {
        schema.validate()?;

        let mut registry = Self::new();
        for family in &schema.families {
            registry.register(Arc::new(OwnershipResolver::new(
                family.clone(),
                store.clone(),
                timeout,
            )));
        }
        Ok(registry)
    }

    /// Register a resolver under its own resource type, replacing any previous one.
    pub fn register(&mut self, resolver: Arc<dyn ContextResolver>) {
        let key = resolver.resource_type().to_string();
        if self.resolvers.insert(key.clone(), resolver).is_some() {
            debug!(resource_type = %key, "Replaced context resolver");
        }
    }

    pub fn get(&self, resource_type: &str) -> Option<Arc<dyn ContextResolver>> {
        self.resolvers.get(resource_type).cloned()
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.resolvers.contains_key(resource_type)
    }

    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("resource_types", &self.resource_types())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryAccessStore, ResourceLinkage};
    use crate::rbac::context::RequestContext;
    use crate::rbac::models::{AuthenticatedUser, Permission};

    fn booking_resolver(store: Arc<MemoryAccessStore>) -> OwnershipResolver {
        OwnershipResolver::new(
            ResourceFamily::new("booking", "bookings")
                .owner_column("user_id")
                .company_column("provider_company_id"),
            store,
            Duration::from_millis(200),
        )
    }

    fn ctx(user: &str, request: RequestContext) -> PermissionContext {
        PermissionContext::new(
            &AuthenticatedUser::new(user, "manager"),
            Permission::own("booking", "read"),
            &request,
        )
    }

    #[tokio::test]
    async fn test_owner_match_skips_membership_lookup() {
        let store = Arc::new(MemoryAccessStore::new());
        store.insert_resource("booking", "B1", ResourceLinkage::owned_by("alice").in_company("c1"));
        let resolver = booking_resolver(store.clone());

        assert!(resolver.resolve(&ctx("alice", RequestContext::new().with_path_id("B1"))).await);
        assert_eq!(store.linkage_queries(), 1);
        assert_eq!(store.membership_queries(), 0);
    }

    #[tokio::test]
    async fn test_active_membership_grants() {
        let store = Arc::new(MemoryAccessStore::new());
        store.insert_resource("booking", "B1", ResourceLinkage::owned_by("alice").in_company("c1"));
        store.insert_membership("bob", "c1", true);
        let resolver = booking_resolver(store.clone());

        assert!(resolver.resolve(&ctx("bob", RequestContext::new().with_path_id("B1"))).await);
        assert_eq!(store.total_queries(), 2);
    }

    #[tokio::test]
    async fn test_inactive_membership_denies() {
        let store = Arc::new(MemoryAccessStore::new());
        store.insert_resource("booking", "B1", ResourceLinkage::owned_by("alice").in_company("c1"));
        store.insert_membership("bob", "c1", false);
        let resolver = booking_resolver(store);

        assert!(!resolver.resolve(&ctx("bob", RequestContext::new().with_path_id("B1"))).await);
    }

    #[tokio::test]
    async fn test_missing_id_denies_without_queries() {
        let store = Arc::new(MemoryAccessStore::new());
        let resolver = booking_resolver(store.clone());

        assert!(!resolver.resolve(&ctx("alice", RequestContext::new())).await);
        assert_eq!(store.total_queries(), 0);
    }

    #[tokio::test]
    async fn test_store_error_denies() {
        let store = Arc::new(MemoryAccessStore::new());
        store.insert_resource("booking", "B1", ResourceLinkage::owned_by("alice"));
        store.set_failing(true);
        let resolver = booking_resolver(store);

        assert!(!resolver.resolve(&ctx("alice", RequestContext::new().with_path_id("B1"))).await);
    }

    #[tokio::test]
    async fn test_timeout_denies() {
        let store = Arc::new(MemoryAccessStore::new());
        store.insert_resource("booking", "B1", ResourceLinkage::owned_by("alice"));
        store.set_latency(Some(Duration::from_secs(5)));
        let resolver = OwnershipResolver::new(
            ResourceFamily::new("booking", "bookings").owner_column("user_id"),
            store,
            Duration::from_millis(20),
        );

        assert!(!resolver.resolve(&ctx("alice", RequestContext::new().with_path_id("B1"))).await);
    }

    #[test]
    fn test_registry_from_default_schema() {
        let store: Arc<dyn AccessStore> = Arc::new(MemoryAccessStore::new());
        let registry =
            ResolverRegistry::from_schema(&AccessSchema::default(), store, Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            registry.resource_types(),
            vec!["booking", "company", "contract", "timesheet"]
        );
        assert!(registry.get("booking").is_some());
        assert!(registry.get("invoice").is_none());
    }
}
