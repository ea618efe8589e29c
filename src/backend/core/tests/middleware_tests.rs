//! Integration tests for the Axum permission layer.
//!
//! Tests cover:
//! - Uniform 403 bodies for every deny reason
//! - Resource ids read from path, JSON body and query string
//! - Body restoration for downstream handlers
//! - Bodies left unread when the verdict does not depend on them
//! - The `AccessGrant` extractor

use axum::{
    body::{Body, Bytes},
    http::{header, Request, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use staffgate_core::config::AccessConfig;
use staffgate_core::db::{MemoryAccessStore, ResourceLinkage};
use staffgate_core::rbac::{
    AccessGrant, AuthenticatedUser, DecisionReason, PermissionGuard, RequirePermissionLayer,
    ResourceIdSource,
};
use std::sync::Arc;
use tower::ServiceExt;

fn fixture() -> (Arc<PermissionGuard>, Arc<MemoryAccessStore>) {
    let store = Arc::new(MemoryAccessStore::new());
    store.insert_resource("booking", "B123", ResourceLinkage::owned_by("owner").in_company("acme"));
    store.insert_membership("m-active", "acme", true);
    store.insert_membership("m-inactive", "acme", false);
    let guard = PermissionGuard::from_config(&AccessConfig::default(), store.clone()).unwrap();
    (Arc::new(guard), store)
}

async fn show_booking(grant: AccessGrant) -> Json<Value> {
    Json(json!({
        "user": grant.user.id.as_str(),
        "reason": grant.reason.as_str(),
        "resource": grant.resource.as_ref().map(|r| r.id.clone()),
        "source": grant.resource.as_ref().map(|r| r.source.to_string()),
    }))
}

async fn echo_booking(grant: AccessGrant, Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(grant.resource.map(|r| r.source), Some(ResourceIdSource::Body));
    Json(body)
}

async fn accept_upload(grant: AccessGrant, body: Bytes) -> Json<Value> {
    Json(json!({
        "reason": grant.reason.as_str(),
        "received": body.len(),
    }))
}

fn app(guard: Arc<PermissionGuard>) -> Router {
    Router::new()
        .route("/bookings/:id", get(show_booking))
        .route("/bookings", get(show_booking).post(echo_booking))
        .route_layer(RequirePermissionLayer::new(guard, "booking:read:own"))
}

fn request(method: &str, uri: &str, user: Option<AuthenticatedUser>, body: Body) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.extension(user);
    }
    builder.body(body).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Deny Responses
// ============================================================================

#[tokio::test]
async fn test_denies_are_indistinguishable() {
    let (guard, _store) = fixture();

    let cases = [
        None,
        Some(AuthenticatedUser::new("m-inactive", "manager")),
        Some(AuthenticatedUser::new("x", "nobody")),
    ];

    let mut bodies = Vec::new();
    for user in cases {
        let response = app(guard.clone())
            .oneshot(request("GET", "/bookings/B123", user, Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        bodies.push((body["error"]["code"].clone(), body["error"]["message"].clone()));
    }

    assert!(bodies.iter().all(|b| b == &bodies[0]));
    assert_eq!(bodies[0].0, "FORBIDDEN");
    assert_eq!(bodies[0].1, "Access denied");
}

#[tokio::test]
async fn test_body_over_limit_denied() {
    let (guard, _store) = fixture();
    let app = Router::new()
        .route("/bookings", post(echo_booking))
        .route_layer(RequirePermissionLayer::new(guard, "booking:read:own").body_limit(16));

    let body = json!({ "id": "B123", "padding": "x".repeat(64) }).to_string();
    let response = app
        .oneshot(request(
            "POST",
            "/bookings",
            Some(AuthenticatedUser::new("owner", "user")),
            Body::from(body),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ============================================================================
// Identifier Sources
// ============================================================================

#[tokio::test]
async fn test_path_id_with_active_membership() {
    let (guard, store) = fixture();

    let response = app(guard)
        .oneshot(request(
            "GET",
            "/bookings/B123",
            Some(AuthenticatedUser::new("m-active", "manager")),
            Body::empty(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["resource"], "B123");
    assert_eq!(body["source"], "path");
    assert_eq!(body["reason"], DecisionReason::AllowedOwnershipMatch.as_str());
    assert_eq!(store.total_queries(), 2);
}

#[tokio::test]
async fn test_query_id() {
    let (guard, _store) = fixture();

    let response = app(guard)
        .oneshot(request(
            "GET",
            "/bookings?id=B123",
            Some(AuthenticatedUser::new("owner", "user")),
            Body::empty(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["source"], "query");
}

#[tokio::test]
async fn test_body_id_and_body_restored() {
    let (guard, _store) = fixture();
    let payload = json!({ "id": "B123", "note": "keep me" });

    let response = app(guard)
        .oneshot(request(
            "POST",
            "/bookings",
            Some(AuthenticatedUser::new("owner", "user")),
            Body::from(payload.to_string()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, payload);
}

#[tokio::test]
async fn test_path_wins_over_query() {
    let (guard, store) = fixture();
    store.insert_resource("booking", "OTHER", ResourceLinkage::owned_by("someone-else"));

    let response = app(guard)
        .oneshot(request(
            "GET",
            "/bookings/OTHER?id=B123",
            Some(AuthenticatedUser::new("owner", "user")),
            Body::empty(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_custom_id_field() {
    let (guard, _store) = fixture();
    let app = Router::new()
        .route("/companies/:company_id/bookings/:booking_id", get(show_booking))
        .route_layer(RequirePermissionLayer::new(guard, "booking:read:own").id_field("booking_id"));

    let response = app
        .oneshot(request(
            "GET",
            "/companies/acme/bookings/B123",
            Some(AuthenticatedUser::new("owner", "user")),
            Body::empty(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["resource"], "B123");
}

#[tokio::test]
async fn test_all_scope_passes_without_identifier() {
    let (guard, store) = fixture();

    let response = app(guard)
        .oneshot(request(
            "GET",
            "/bookings",
            Some(AuthenticatedUser::new("a1", "admin")),
            Body::empty(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["reason"], DecisionReason::AllowedWildcardScope.as_str());
    assert_eq!(body["resource"], Value::Null);
    assert_eq!(store.total_queries(), 0);
}

// ============================================================================
// Body Buffering
// ============================================================================

#[tokio::test]
async fn test_all_scope_ignores_body_limit() {
    let (guard, store) = fixture();
    let app = Router::new()
        .route("/bookings", post(accept_upload))
        .route_layer(RequirePermissionLayer::new(guard, "booking:create:all"));

    let payload = json!({ "notes": "x".repeat(100 * 1024) }).to_string();
    let sent = payload.len();
    let response = app
        .oneshot(request(
            "POST",
            "/bookings",
            Some(AuthenticatedUser::new("a1", "admin")),
            Body::from(payload),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["reason"], DecisionReason::AllowedWildcardScope.as_str());
    assert_eq!(body["received"], sent);
    assert_eq!(store.total_queries(), 0);
}

#[tokio::test]
async fn test_path_id_skips_body_read() {
    let (guard, _store) = fixture();
    let app = Router::new()
        .route("/bookings/:id", post(accept_upload))
        .route_layer(RequirePermissionLayer::new(guard, "booking:read:own").body_limit(16));

    let payload = json!({ "id": "ignored", "padding": "x".repeat(64) }).to_string();
    let sent = payload.len();
    let response = app
        .oneshot(request(
            "POST",
            "/bookings/B123",
            Some(AuthenticatedUser::new("owner", "user")),
            Body::from(payload),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["reason"], DecisionReason::AllowedOwnershipMatch.as_str());
    assert_eq!(body["received"], sent);
}
