//! Shared helpers for the router-level integration tests

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::Value;
use snip::app::{open_storage, App};
use snip::config::{AuthMode, Config};
use std::net::SocketAddr;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Application over a fresh in-memory database
pub async fn test_app(config: &Config) -> App {
    let storage = open_storage(&config.database)
        .await
        .expect("in-memory storage should open");
    App::build(config, storage).expect("app should build")
}

pub fn jwt_config() -> Config {
    let mut config = Config::for_testing();
    config.auth.mode = AuthMode::Jwt;
    config.auth.jwt_secret = Some(TEST_SECRET.to_string());
    config
}

/// Router with a fixed peer address, as `into_make_service_with_connect_info` would provide
pub fn router(app: &App) -> Router {
    app.router
        .clone()
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 12345))))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body should be JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse {
        status,
        headers,
        body: body.to_vec(),
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    with_token(Request::builder().method("GET").uri(uri), token)
        .body(Body::empty())
        .unwrap()
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    with_token(Request::builder().method("DELETE").uri(uri), token)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    with_token(Request::builder().method("POST").uri(uri), token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_token(
    builder: axum::http::request::Builder,
    token: Option<&str>,
) -> axum::http::request::Builder {
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

/// Create a link through the API and return its short code
pub async fn create_link(router: &Router, url: &str, token: Option<&str>) -> String {
    let response = send(
        router,
        post_json("/api/urls", serde_json::json!({ "original_url": url }), token),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
    response.json()["short_code"]
        .as_str()
        .expect("short_code should be a string")
        .to_string()
}
