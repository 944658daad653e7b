//! Integration tests for the license HTTP gateway.
//!
//! Requests run through the full router (auth extractors, upload parsing,
//! body limit, request logging) against an in-memory SQLite database.

#![cfg(all(feature = "server", feature = "sqlite"))]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use entitle::config::AuthConfig;
use entitle::server::auth::{AuthState, JwtValidator, Role};
use entitle::server::database::Database;
use entitle::server::handlers::AppState;
use entitle::server::logging::REQUEST_ID_HEADER;
use entitle::server::routes::build_router;
use entitle::store::LicenseStore;

const LICENSE_URI: &str = "/api/v1/license";
const BOUNDARY: &str = "entitle-test-boundary";
const TEST_SECRET: &str = "gateway-test-secret";

/// Helper to create an in-memory database with the schema applied.
async fn setup_db() -> Arc<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite");

    let db = Arc::new(Database::SQLite(pool));
    db.migrate().await.expect("failed to migrate");
    db
}

fn auth_config() -> AuthConfig {
    AuthConfig {
        enabled: true,
        jwt_secret: TEST_SECRET.to_string(),
        ..AuthConfig::default()
    }
}

/// App with authentication disabled: every caller is an administrator.
async fn open_app(max_upload_bytes: usize) -> (Router, Arc<Database>) {
    let db = setup_db().await;
    let state = AppState::new(Arc::clone(&db), AuthState::disabled(), max_upload_bytes);
    (build_router(state), db)
}

/// App with JWT authentication enabled.
async fn secured_app() -> (Router, Arc<Database>) {
    let db = setup_db().await;
    let auth = AuthState::from_config(&auth_config()).expect("auth state");
    let state = AppState::new(Arc::clone(&db), auth, 1024 * 1024);
    (build_router(state), db)
}

fn token_for(role: Role) -> String {
    JwtValidator::from_config(&auth_config())
        .expect("validator")
        .create_token("tester", role)
        .expect("token")
}

fn multipart_body(code: Option<&str>, file: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(code) = code {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"license_code\"\r\n\r\n{code}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(file) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"license_file\"; filename=\"license.lic\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));

    (status, body)
}

fn get_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(LICENSE_URI);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn json_post(body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(LICENSE_URI)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn multipart_post(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(LICENSE_URI)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn delete_request() -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(LICENSE_URI)
        .body(Body::empty())
        .unwrap()
}

// =============================================================================
// Reading
// =============================================================================

#[tokio::test]
async fn get_without_license_returns_default_state() {
    let (app, _db) = open_app(1024).await;

    let (status, body) = send(app, get_request(None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "edition": 3, "state": 1, "type": "", "code": "" }));
}

#[tokio::test]
async fn responses_carry_request_id() {
    let (app, _db) = open_app(1024).await;

    let response = app.oneshot(get_request(None)).await.unwrap();

    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn health_reports_database() {
    let (app, _db) = open_app(1024).await;

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["connected"], true);
    assert_eq!(body["database"]["db_type"], "sqlite");
}

// =============================================================================
// Installing
// =============================================================================

#[tokio::test]
async fn json_code_upload_installs_code_license() {
    let (app, db) = open_app(1024).await;

    let (status, body) = send(
        app.clone(),
        json_post(json!({ "license_type": "code", "license_code": "ABC-123" }), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "code");
    assert_eq!(body["code"], "ABC-123");
    assert_eq!(body["edition"], 3);
    assert_eq!(body["state"], 1);

    let (status, body) = send(app, get_request(None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "ABC-123");

    let stored = db.get_current().await.unwrap().expect("stored license");
    assert_eq!(stored.data, b"ABC-123".to_vec());
}

#[tokio::test]
async fn json_code_is_trimmed() {
    let (app, _db) = open_app(1024).await;

    let (status, body) = send(app, json_post(json!({ "license_code": "  XYZ-9 \n" }), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "XYZ-9");
}

#[tokio::test]
async fn urlencoded_code_upload() {
    let (app, _db) = open_app(1024).await;

    let request = Request::builder()
        .method("POST")
        .uri(LICENSE_URI)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from("license_type=code&license_code=FORM-1"))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "code");
    assert_eq!(body["code"], "FORM-1");
}

#[tokio::test]
async fn multipart_file_upload_stores_exact_bytes() {
    let (app, db) = open_app(64 * 1024).await;
    let file: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

    let (status, body) = send(app, multipart_post(multipart_body(None, Some(&file)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "file");
    assert_eq!(body["code"], "");

    let stored = db.get_current().await.unwrap().expect("stored license");
    assert_eq!(stored.data.len(), 1000);
    assert_eq!(stored.data, file);
}

#[tokio::test]
async fn file_wins_over_code() {
    let (app, _db) = open_app(64 * 1024).await;

    let body = multipart_body(Some("IGNORED-CODE"), Some(b"file-bytes"));
    let (status, body) = send(app, multipart_post(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "file");
}

#[tokio::test]
async fn second_upload_replaces_first() {
    let (app, db) = open_app(1024).await;

    send(app.clone(), json_post(json!({ "license_code": "FIRST" }), None)).await;
    let (status, body) = send(app, json_post(json!({ "license_code": "SECOND" }), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "SECOND");
    assert_eq!(db.count().await.unwrap(), 1);
}

#[tokio::test]
async fn empty_upload_is_rejected_and_store_untouched() {
    let (app, db) = open_app(1024).await;
    send(app.clone(), json_post(json!({ "license_code": "KEEP" }), None)).await;

    let (status, body) = send(app.clone(), json_post(json!({ "license_code": "   " }), None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_FIELD");
    assert_eq!(body["error"]["message"], "missing license input");

    let (status, body) = send(app, multipart_post(multipart_body(Some(""), Some(b"")))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_FIELD");

    let stored = db.get_current().await.unwrap().expect("license kept");
    assert_eq!(stored.code, "KEEP");
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let (app, db) = open_app(128).await;
    let file = vec![b'x'; 4096];

    let (status, body) = send(app, multipart_post(multipart_body(None, Some(&file)))).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    assert!(db.get_current().await.unwrap().is_none());
}

#[tokio::test]
async fn unsupported_content_type_is_rejected() {
    let (app, _db) = open_app(1024).await;

    let request = Request::builder()
        .method("POST")
        .uri(LICENSE_URI)
        .header("Content-Type", "text/plain")
        .body(Body::from("ABC-123"))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

// =============================================================================
// Removing
// =============================================================================

#[tokio::test]
async fn delete_restores_default_state() {
    let (app, _db) = open_app(1024).await;
    send(app.clone(), json_post(json!({ "license_code": "ABC-123" }), None)).await;

    let (status, body) = send(app.clone(), delete_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = send(app, get_request(None)).await;
    assert_eq!(body["type"], "");
    assert_eq!(body["code"], "");
}

#[tokio::test]
async fn delete_without_license_succeeds() {
    let (app, _db) = open_app(1024).await;

    let (status, body) = send(app, delete_request()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

// =============================================================================
// Authorization
// =============================================================================

#[tokio::test]
async fn secured_read_requires_token() {
    let (app, _db) = secured_app().await;

    let (status, body) = send(app, get_request(None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "MISSING_TOKEN");
}

#[tokio::test]
async fn secured_read_accepts_user_token() {
    let (app, _db) = secured_app().await;
    let token = token_for(Role::User);

    let (status, body) = send(app, get_request(Some(&token))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["edition"], 3);
}

#[tokio::test]
async fn secured_upload_rejects_user_role() {
    let (app, db) = secured_app().await;
    let token = token_for(Role::User);

    let (status, body) = send(
        app,
        json_post(json!({ "license_code": "ABC-123" }), Some(&token)),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_ROLE");
    assert!(db.get_current().await.unwrap().is_none());
}

#[tokio::test]
async fn secured_delete_rejects_user_role() {
    let (app, _db) = secured_app().await;
    let token = token_for(Role::User);

    let request = Request::builder()
        .method("DELETE")
        .uri(LICENSE_URI)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_ROLE");
}

#[tokio::test]
async fn secured_upload_accepts_admin_role() {
    let (app, _db) = secured_app().await;
    let token = token_for(Role::Admin);

    let (status, body) = send(
        app,
        json_post(json!({ "license_code": "ABC-123" }), Some(&token)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "ABC-123");
}

#[tokio::test]
async fn secured_rejects_garbage_token() {
    let (app, _db) = secured_app().await;

    let (status, body) = send(app, get_request(Some("not-a-jwt"))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn secured_rejects_non_bearer_header() {
    let (app, _db) = secured_app().await;

    let request = Request::builder()
        .uri(LICENSE_URI)
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_HEADER");
}
