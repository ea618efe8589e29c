//! Axum authorization layer that runs the permission guard per request.
//!
//! The layer reads the [`AuthenticatedUser`] placed in request extensions by
//! the session layer, gathers candidate resource ids from the path, the JSON
//! body and the query string, and asks the [`PermissionGuard`] for a verdict.
//! The body is buffered (up to the layer's limit) only when an `own` grant
//! decides and no path id is present.
//!
//! Every deny produces the same 403 body, whatever the reason. Apply with
//! `Router::route_layer` so path parameters are available.

use axum::{
    body::Body,
    extract::{FromRequestParts, Query, RawPathParams, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

use super::context::{RequestContext, ResourceIdSource, ResourceRef};
use super::guard::{DecisionReason, PermissionGuard};
use super::models::AuthenticatedUser;
use crate::error::AuthzError;

/// Default name of the field carrying the resource id.
pub const DEFAULT_ID_FIELD: &str = "id";

/// Default cap on how much request body is buffered for id extraction.
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

// ═══════════════════════════════════════════════════════════════════════════════
// Access Grant (extracted in handlers)
// ═══════════════════════════════════════════════════════════════════════════════

/// Inserted into request extensions after an allow so handlers can see who
/// was let through and why, without re-running the check.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub user: AuthenticatedUser,
    pub permission: String,
    pub reason: DecisionReason,
    pub resource: Option<ResourceRef>,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AccessGrant
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AccessGrant>().cloned().ok_or_else(|| {
            let body = serde_json::json!({
                "success": false,
                "error": {
                    "code": "MISSING_ACCESS_GRANT",
                    "message": "Authorization context not available. Ensure the permission layer is applied.",
                }
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer requiring one permission on every request it wraps.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/bookings/:id", get(show_booking))
///     .route_layer(RequirePermissionLayer::new(guard.clone(), "booking:read:own"));
/// ```
#[derive(Clone)]
pub struct RequirePermissionLayer {
    guard: Arc<PermissionGuard>,
    permission: Arc<str>,
    id_field: Arc<str>,
    body_limit: usize,
}

impl RequirePermissionLayer {
    pub fn new(guard: Arc<PermissionGuard>, permission: impl AsRef<str>) -> Self {
        Self {
            guard,
            permission: Arc::from(permission.as_ref()),
            id_field: Arc::from(DEFAULT_ID_FIELD),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Read the resource id from `field` instead of `id`.
    pub fn id_field(mut self, field: impl AsRef<str>) -> Self {
        self.id_field = Arc::from(field.as_ref());
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

impl<S> Layer<S> for RequirePermissionLayer {
    type Service = RequirePermissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePermissionService {
            inner,
            guard: self.guard.clone(),
            permission: self.permission.clone(),
            id_field: self.id_field.clone(),
            body_limit: self.body_limit,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct RequirePermissionService<S> {
    inner: S,
    guard: Arc<PermissionGuard>,
    permission: Arc<str>,
    id_field: Arc<str>,
    body_limit: usize,
}

impl<S> Service<Request<Body>> for RequirePermissionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let guard = self.guard.clone();
        let permission = self.permission.clone();
        let id_field = self.id_field.clone();
        let body_limit = self.body_limit;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(user) = request.extensions().get::<AuthenticatedUser>().cloned() else {
                let decision = guard
                    .authorize(None, &permission, &RequestContext::new())
                    .await;
                return Ok(denied_response(decision.reason()));
            };

            let (mut parts, body) = request.into_parts();

            let path_params = path_params(&mut parts).await;
            let query_params = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
                .map(|Query(q)| q)
                .unwrap_or_default();

            let mut ctx = RequestContext::from_sources(&id_field, &path_params, None, &query_params);

            // A body id only matters when no path id outranks it and an `own`
            // grant is the one deciding; otherwise the body passes through unread.
            let path_decides = ctx
                .resource_id()
                .is_some_and(|r| r.source == ResourceIdSource::Path);
            let body = if !path_decides && guard.requires_ownership_check(&user, &permission) {
                let bytes = match axum::body::to_bytes(body, body_limit).await {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        debug!(error = %error, limit = body_limit, "Unreadable request body");
                        return Ok(denied_response(DecisionReason::DeniedOwnershipMismatch));
                    }
                };
                if let Ok(json_body) = serde_json::from_slice::<Value>(&bytes) {
                    ctx = RequestContext::from_sources(
                        &id_field,
                        &path_params,
                        Some(&json_body),
                        &query_params,
                    );
                }
                Body::from(bytes)
            } else {
                body
            };

            let decision = guard.authorize(Some(&user), &permission, &ctx).await;
            if decision.is_denied() {
                return Ok(denied_response(decision.reason()));
            }

            parts.extensions.insert(AccessGrant {
                user,
                permission: permission.to_string(),
                reason: decision.reason(),
                resource: ctx.resource_id(),
            });

            inner.call(Request::from_parts(parts, body)).await
        })
    }
}

/// Matched route parameters, or nothing when the layer sits outside a route.
async fn path_params(parts: &mut Parts) -> HashMap<String, String> {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => params
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        Err(_) => HashMap::new(),
    }
}

fn denied_response(reason: DecisionReason) -> Response {
    AuthzError::access_denied(reason.as_str()).into_response()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::resolver::ResolverRegistry;
    use crate::rbac::roles::RoleTable;

    fn guard() -> Arc<PermissionGuard> {
        Arc::new(PermissionGuard::new(
            Arc::new(RoleTable::with_defaults()),
            ResolverRegistry::new(),
        ))
    }

    #[test]
    fn test_layer_defaults() {
        let layer = RequirePermissionLayer::new(guard(), "booking:read:own");
        assert_eq!(&*layer.permission, "booking:read:own");
        assert_eq!(&*layer.id_field, DEFAULT_ID_FIELD);
        assert_eq!(layer.body_limit, DEFAULT_BODY_LIMIT);
    }

    #[test]
    fn test_layer_builders() {
        let layer = RequirePermissionLayer::new(guard(), "booking:read:own")
            .id_field("booking_id")
            .body_limit(1024);
        assert_eq!(&*layer.id_field, "booking_id");
        assert_eq!(layer.body_limit, 1024);
    }

    #[test]
    fn test_denied_response_is_forbidden() {
        let response = denied_response(DecisionReason::DeniedNoSession);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
