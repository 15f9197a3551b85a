use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use mongodb::{bson::oid::ObjectId, Client};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::build_router;
use crate::config::AppConfig;
use crate::middleware::auth::create_token;
use crate::models::role::Role;
use crate::services::{otp_store::MemoryOtpStore, password::PasswordHasher};
use crate::state::AppState;
use crate::tests::fakes::RecordingSender;

// Every request below is answered before the handler reaches MongoDB, so
// the client never has to connect.
async fn app() -> (Router, AppConfig) {
    let config = AppConfig::for_tests();
    let client = Client::with_uri_str("mongodb://127.0.0.1:27017/?serverSelectionTimeoutMS=500")
        .await
        .unwrap();
    let state = AppState::new(
        client.database(&config.database_name),
        config.clone(),
        Arc::new(MemoryOtpStore::new()),
        Arc::new(RecordingSender::default()),
        None,
        PasswordHasher::with_cost(4),
    );
    (build_router(state), config)
}

fn bearer(config: &AppConfig, role: Role) -> String {
    let token = create_token(&ObjectId::new(), role, &config.jwt_secret, 1).unwrap();
    format!("Bearer {}", token)
}

fn json_request(method: &str, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_root_and_health_respond() {
    let (app, _) = app().await;
    let response = app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_protected_routes_require_a_token() {
    let (app, _) = app().await;
    for uri in ["/api/students", "/api/library", "/api/payments", "/api/notifications", "/api/auth/me"] {
        let (status, body) =
            send(app.clone(), Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "unauthorized");
    }
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let (app, config) = app().await;
    let other = AppConfig {
        jwt_secret: "someone-else".to_string(),
        ..config
    };
    let auth = bearer(&other, Role::Owner);
    let (status, _) = send(
        app,
        Request::get("/api/library")
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_students_cannot_manage_resources() {
    let (app, config) = app().await;
    let auth = bearer(&config, Role::Student);

    let (status, body) = send(
        app.clone(),
        json_request(
            "POST",
            "/api/students",
            Some(&auth),
            json!({
                "library_id": ObjectId::new().to_hex(),
                "name": "Ravi Kumar",
                "email": "ravi@example.com",
                "password": "secret123",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = send(
        app.clone(),
        json_request(
            "POST",
            "/api/payments",
            Some(&auth),
            json!({
                "student_id": ObjectId::new().to_hex(),
                "amount": 500.0,
                "method": "cash",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        app,
        Request::get("/api/library")
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_malformed_library_id_is_bad_request() {
    let (app, config) = app().await;
    let auth = bearer(&config, Role::Owner);
    let (status, body) = send(
        app,
        Request::get("/api/library/not-an-id")
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_id");
}

#[tokio::test]
async fn test_signup_validates_input() {
    let (app, _) = app().await;
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/signup",
            None,
            json!({ "name": "Asha", "email": "not-an-email", "password": "secret123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_reset_password_rejects_short_password() {
    let (app, _) = app().await;
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/reset-password",
            None,
            json!({ "token": "abc", "new_password": "123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_verify_otp_without_pending_code() {
    let (app, _) = app().await;
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/verify-otp",
            None,
            json!({ "email": "asha@example.com", "otp": "1234" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "otp_not_found");
}

#[tokio::test]
async fn test_missing_body_field_uses_error_envelope() {
    let (app, _) = app().await;
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/verify-otp",
            None,
            json!({ "email": "asha@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("otp"));
}

#[tokio::test]
async fn test_unparseable_body_uses_error_envelope() {
    let (app, _) = app().await;
    let request = Request::post("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_malformed_query_uses_error_envelope() {
    let (app, config) = app().await;
    let auth = bearer(&config, Role::Owner);
    for uri in ["/api/payments?page=x", "/api/payments?status=bogus"] {
        let (status, body) = send(
            app.clone(),
            Request::get(uri)
                .header(header::AUTHORIZATION, auth.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "validation_error");
    }
}

#[tokio::test]
async fn test_otp_with_surrounding_spaces_reaches_verification() {
    let (app, _) = app().await;
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/verify-otp",
            None,
            json!({ "email": "asha@example.com", "otp": " 1234 " }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "otp_not_found");
}
