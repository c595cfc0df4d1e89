//! API Integration Tests
//!
//! Every test drives the full router over in-memory stores.
//!
//! Author: hephaex@gmail.com

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tessera_api::middleware::GovernorRateLimiter;
use tessera_api::{create_router, create_router_for_testing, test_state};
use tower::ServiceExt;

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn register(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        create_json_request(
            "POST",
            "/api/v1/auth/register",
            Some(json!({ "email": email, "password": password })),
        ),
    )
    .await
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        create_json_request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": email, "password": password })),
        ),
    )
    .await
}

async fn refresh(app: &Router, refresh_token: &str) -> (StatusCode, Value) {
    send(
        app,
        create_json_request(
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({ "refresh_token": refresh_token })),
        ),
    )
    .await
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
}

#[tokio::test]
async fn test_not_ready_after_shutdown_begins() {
    let state = Arc::new(test_state());
    state.set_ready(false);
    let app = create_router(state);

    let (status, json) = send(
        &app,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["ready"], false);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_router_for_testing();
    register(&app, "metrics@example.com", "Str0ng!Pass").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("tessera_http_requests_total"));
    assert!(text.contains("tessera_session_operations_total"));
}

#[tokio::test]
async fn test_openapi_document() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/v1/auth/refresh"].is_object());
    assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
}

// =============================================================================
// Session Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_register_returns_token_pair() {
    let app = create_router_for_testing();

    let (status, json) = register(&app, "Alice@Example.com", "Str0ng!Pass").await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(json["access_token"].is_string());
    assert!(json["refresh_token"].is_string());
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["expires_in"], 900);
    assert_eq!(json["account"]["email"], "alice@example.com");
    assert_eq!(json["account"]["is_verified"], false);
    assert!(json["account"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_register_validation_errors() {
    let app = create_router_for_testing();

    let (status, json) = register(&app, "not-an-email", "Str0ng!Pass").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_EMAIL");

    let (status, json) = register(&app, "bob@example.com", "password").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "WEAK_PASSWORD");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = create_router_for_testing();

    let (status, _) = register(&app, "alice@example.com", "Str0ng!Pass").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = register(&app, "ALICE@example.com", "Str0ng!Pass").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "ACCOUNT_EXISTS");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "alice@example.com" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_login_failures_are_uniform() {
    let app = create_router_for_testing();
    register(&app, "alice@example.com", "Str0ng!Pass").await;

    let (wrong_status, wrong_json) = login(&app, "alice@example.com", "Wr0ng!Pass").await;
    let (unknown_status, unknown_json) = login(&app, "nobody@example.com", "Str0ng!Pass").await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_json, unknown_json);
}

#[tokio::test]
async fn test_login_and_me() {
    let app = create_router_for_testing();
    let (_, registered) = register(&app, "alice@example.com", "Str0ng!Pass").await;

    let (status, json) = login(&app, "alice@example.com", "Str0ng!Pass").await;
    assert_eq!(status, StatusCode::OK);

    let token = json["access_token"].as_str().unwrap();
    let (status, me) = send(&app, bearer_request("GET", "/api/v1/auth/me", token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], registered["account"]["id"]);
    assert_eq!(me["email"], "alice@example.com");
}

#[tokio::test]
async fn test_me_requires_valid_token() {
    let app = create_router_for_testing();

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/api/v1/auth/me")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = send(&app, bearer_request("GET", "/api/v1/auth/me", "a.b.c")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "INVALID_ACCESS_TOKEN");
}

#[tokio::test]
async fn test_refresh_rotation_and_reuse() {
    let app = create_router_for_testing();
    let (_, registered) = register(&app, "alice@example.com", "Str0ng!Pass").await;
    let original = registered["refresh_token"].as_str().unwrap().to_string();

    let (status, rotated) = refresh(&app, &original).await;
    assert_eq!(status, StatusCode::OK);
    let successor = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(successor, original);

    // Replaying the original revokes the whole family
    let (status, json) = refresh(&app, &original).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "INVALID_REFRESH_TOKEN");

    let (status, _) = refresh(&app, &successor).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_with_unknown_token() {
    let app = create_router_for_testing();

    let (status, json) = refresh(&app, "never-issued").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "INVALID_REFRESH_TOKEN");
}

#[tokio::test]
async fn test_logout_revokes_all_sessions() {
    let app = create_router_for_testing();
    let (_, first) = register(&app, "alice@example.com", "Str0ng!Pass").await;
    let (_, second) = login(&app, "alice@example.com", "Str0ng!Pass").await;

    let access_token = first["access_token"].as_str().unwrap();
    let (status, body) = send(
        &app,
        bearer_request("POST", "/api/v1/auth/logout", access_token),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    for session in [&first, &second] {
        let (status, _) = refresh(&app, session["refresh_token"].as_str().unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Idempotent
    let (status, _) = send(
        &app,
        bearer_request("POST", "/api/v1/auth/logout", access_token),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_logout_without_token() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request("POST", "/api/v1/auth/logout", None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "INVALID_ACCESS_TOKEN");
}

#[tokio::test]
async fn test_responses_are_not_cacheable() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(create_json_request(
            "POST",
            "/api/v1/auth/register",
            Some(json!({ "email": "alice@example.com", "password": "Str0ng!Pass" })),
        ))
        .await
        .unwrap();

    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    assert_eq!(
        response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
        "nosniff"
    );
}

// =============================================================================
// Rate Limiting Tests
// =============================================================================

fn limited_router(trust_proxy_headers: bool) -> Router {
    let mut state = test_state();
    let mut config = (*state.config).clone();
    config.rate_limit.trust_proxy_headers = trust_proxy_headers;
    state.config = Arc::new(config);
    state.rate_limiter = Some(Arc::new(GovernorRateLimiter::new(1, 2).unwrap()));
    create_router(Arc::new(state))
}

/// Rejected refresh from `peer`, claiming to be `forwarded_for`
fn refresh_attempt(peer: &str, forwarded_for: &str) -> Request<Body> {
    let mut request = create_json_request(
        "POST",
        "/api/v1/auth/refresh",
        Some(json!({ "refresh_token": "guessed-token" })),
    );
    request
        .headers_mut()
        .insert("x-forwarded-for", forwarded_for.parse().unwrap());
    let peer: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

#[tokio::test]
async fn test_auth_endpoints_are_rate_limited() {
    let app = limited_router(false);
    let peer = "198.51.100.20:51000";

    for _ in 0..2 {
        let (status, _) = send(&app, refresh_attempt(peer, "203.0.113.50")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, json) = send(&app, refresh_attempt(peer, "203.0.113.50")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["code"], "RATE_LIMITED");

    // Health checks are never limited
    let mut request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_reset_quota() {
    let app = limited_router(false);
    let peer = "198.51.100.21:51000";

    let mut statuses = Vec::new();
    for i in 1..=5 {
        let spoofed = format!("203.0.113.{i}");
        statuses.push(send(&app, refresh_attempt(peer, &spoofed)).await.0);
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::UNAUTHORIZED,
            StatusCode::UNAUTHORIZED,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );

    // Another peer has its own quota
    let (status, _) = send(&app, refresh_attempt("198.51.100.22:51000", "203.0.113.1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_trusted_proxy_headers_key_by_forwarded_client() {
    let app = limited_router(true);
    let proxy = "10.0.0.5:443";

    for _ in 0..2 {
        let (status, _) = send(&app, refresh_attempt(proxy, "203.0.113.60")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = send(&app, refresh_attempt(proxy, "203.0.113.60")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Same proxy, different forwarded client
    let (status, _) = send(&app, refresh_attempt(proxy, "203.0.113.61")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
