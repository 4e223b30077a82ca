//! Common test utilities for API integration tests

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::{json, Value};

use gatewiki_api::{routes, AppState, Config};
use gatewiki_shared::MemoryKv;

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_string(),
        public_url: "http://localhost:3000".to_string(),
        redis_url: None,
        csrf_secret: "integration-test-secret-at-least-32-chars".to_string(),
        csrf_strict_ip: false,
        turnstile_secret_key: None,
        min_form_fill_seconds: 3,
        // Empty key disables real sends
        resend_api_key: String::new(),
        email_from: "Gatewiki <noreply@test>".to_string(),
        enable_signup: true,
    }
}

/// Spin up the full router over an in-memory store. The returned state
/// shares that store, so tests can drive the auth components directly
/// where no HTTP endpoint exposes a step (e.g. fishing out a confirm
/// token that would normally arrive by email).
pub fn create_test_server() -> (TestServer, AppState) {
    let state = AppState::new(Arc::new(MemoryKv::new()), test_config());
    let server = TestServer::new(routes::create_router(state.clone()))
        .expect("Failed to create test server");
    (server, state)
}

/// Fetch a CSRF token the way a browser would
pub async fn fetch_csrf(server: &TestServer) -> String {
    let response = server.get("/api/v1/auth/csrf").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    body["csrf_token"]
        .as_str()
        .expect("csrf_token missing")
        .to_string()
}

/// Register an account through the public endpoint
pub async fn register(server: &TestServer, username: &str, email: &str, password: &str) {
    let csrf = fetch_csrf(server).await;
    let response = server
        .post("/api/v1/auth/register")
        .json(&json!({
            "username": username,
            "name": "Test User",
            "email": email,
            "password": password,
            "csrf_token": csrf,
            "turnstile_token": "",
            "hp_field": "",
            // Rendered comfortably in the past so the fill-time
            // heuristic does not trip
            "form_timestamp": time::OffsetDateTime::now_utc().unix_timestamp() - 60,
        }))
        .await;
    assert_eq!(response.status_code(), 201);
}

/// Log in and return the raw response for the caller to inspect
pub async fn login(
    server: &TestServer,
    email: &str,
    password: &str,
) -> axum_test::TestResponse {
    let csrf = fetch_csrf(server).await;
    server
        .post("/api/v1/auth/login")
        .json(&json!({
            "email": email,
            "password": password,
            "csrf_token": csrf,
        }))
        .await
}
