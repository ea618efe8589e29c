//! Role-based access control with ownership-scoped grants.
//!
//! This module provides:
//! - **Models**: `resource:action:scope` permissions, identities, permission sets
//! - **Roles**: the fixed role hierarchy and its default grant table
//! - **Context**: where a request names its target resource
//! - **Resolvers**: ownership and company-membership checks per resource type
//! - **Guard**: the allow/deny evaluator
//! - **Middleware**: Axum layer enforcing a permission per route
//!
//! # Usage
//!
//! ```rust,ignore
//! use staffgate_core::rbac::{PermissionGuard, RequestContext, RequirePermissionLayer};
//!
//! let guard = Arc::new(PermissionGuard::from_config(&config.access, store)?);
//!
//! // Check programmatically
//! let decision = guard
//!     .authorize(Some(&user), "booking:read:own", &RequestContext::new().with_path_id("B123"))
//!     .await;
//!
//! // Or per route
//! let app = Router::new()
//!     .route("/bookings/:id", get(show_booking))
//!     .route_layer(RequirePermissionLayer::new(guard.clone(), "booking:read:own"));
//! ```

pub mod context;
pub mod guard;
pub mod middleware;
pub mod models;
pub mod resolver;
pub mod roles;

pub use context::{PermissionContext, RequestContext, ResourceIdSource, ResourceRef};
pub use guard::{AccessDecision, DecisionReason, PermissionGuard, PermissionOverride};
pub use middleware::{AccessGrant, RequirePermissionLayer, RequirePermissionService};
pub use models::{AuthenticatedUser, CompanyId, Permission, PermissionSet, Scope, UserId};
pub use resolver::{ContextResolver, OwnershipResolver, ResolverRegistry};
pub use roles::{Role, RoleTable};
