//! In-process [`AccessStore`] with query counting and fault injection.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use super::{AccessStore, ResourceFamily, ResourceLinkage};
use crate::error::{AuthzError, ErrorCode, Result};
use crate::rbac::models::{CompanyId, UserId};

/// Store holding resource linkage rows and membership rows in memory.
#[derive(Default)]
pub struct MemoryAccessStore {
    /// key = (resource_type, id)
    resources: DashMap<(String, String), ResourceLinkage>,

    /// key = (user, company), value = is_active
    memberships: DashMap<(UserId, CompanyId), bool>,

    linkage_queries: AtomicU64,
    membership_queries: AtomicU64,
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_resource(
        &self,
        resource_type: impl Into<String>,
        id: impl Into<String>,
        linkage: ResourceLinkage,
    ) {
        self.resources.insert((resource_type.into(), id.into()), linkage);
    }

    pub fn remove_resource(&self, resource_type: &str, id: &str) -> bool {
        self.resources
            .remove(&(resource_type.to_string(), id.to_string()))
            .is_some()
    }

    /// Insert or replace a membership row.
    pub fn insert_membership(
        &self,
        user_id: impl Into<UserId>,
        company_id: impl Into<CompanyId>,
        is_active: bool,
    ) {
        self.memberships
            .insert((user_id.into(), company_id.into()), is_active);
    }

    /// Make every subsequent query fail with a store error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent query.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn linkage_queries(&self) -> u64 {
        self.linkage_queries.load(Ordering::SeqCst)
    }

    pub fn membership_queries(&self) -> u64 {
        self.membership_queries.load(Ordering::SeqCst)
    }

    pub fn total_queries(&self) -> u64 {
        self.linkage_queries() + self.membership_queries()
    }

    pub fn reset_counters(&self) {
        self.linkage_queries.store(0, Ordering::SeqCst);
        self.membership_queries.store(0, Ordering::SeqCst);
    }

    async fn simulate(&self) -> Result<()> {
        let latency = *self.latency.lock();
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthzError::with_internal(
                ErrorCode::DatabaseQueryFailed,
                "A database error occurred",
                "injected failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessStore for MemoryAccessStore {
    async fn resource_linkage(
        &self,
        family: &ResourceFamily,
        id: &str,
    ) -> Result<Option<ResourceLinkage>> {
        self.linkage_queries.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        if !family.key_kind.accepts(id) {
            return Ok(None);
        }
        Ok(self
            .resources
            .get(&(family.resource_type.clone(), id.to_string()))
            .map(|r| r.clone()))
    }

    async fn has_active_membership(&self, user_id: &UserId, company_id: &CompanyId) -> Result<bool> {
        self.membership_queries.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        Ok(self
            .memberships
            .get(&(user_id.clone(), company_id.clone()))
            .map(|active| *active)
            .unwrap_or(false))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
