#![allow(clippy::result_large_err)]
//! # Staffgate Core
//!
//! Permission evaluation for a multi-tenant workforce platform.
//!
//! ## Architecture
//!
//! - **RBAC**: role hierarchy, `resource:action:scope` grants, and the guard
//!   that turns them into allow/deny decisions
//! - **Context Resolvers**: ownership and company-membership checks backed by the data store
//! - **Cache**: per-session permission cache with lazy TTL expiry
//! - **DB**: storage descriptors, a PostgreSQL store and an in-memory store
//! - **Telemetry**: structured logging and metric descriptions

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod rbac;
pub mod telemetry;

pub use error::{AuthzError, ErrorCode, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{
        CacheStats, CachedPermissions, Clock, ManualClock, PermissionCache, SessionPermissions,
        SystemClock,
    };
    pub use crate::config::{AccessConfig, Config, DatabaseConfig};
    pub use crate::db::{
        AccessSchema, AccessStore, Database, KeyKind, MembershipSchema, MemoryAccessStore,
        PgAccessStore, ResourceFamily, ResourceLinkage,
    };
    pub use crate::error::{AuthzError, ErrorCode, ErrorDetails, ErrorSeverity, Result};
    pub use crate::rbac::{
        AccessDecision, AccessGrant, AuthenticatedUser, CompanyId, ContextResolver,
        DecisionReason, OwnershipResolver, Permission, PermissionContext, PermissionGuard,
        PermissionOverride, PermissionSet, RequestContext, RequirePermissionLayer,
        RequirePermissionService, ResolverRegistry, ResourceIdSource, ResourceRef, Role,
        RoleTable, Scope, UserId,
    };
}
