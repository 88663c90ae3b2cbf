//! Ownership and bearer-token integration tests

mod common;

use axum::http::StatusCode;
use serde_json::json;
use snip::auth::AuthService;
use snip::config::Config;

use common::{create_link, delete, get, jwt_config, post_json, router, send, test_app};

fn token(config: &Config, account_id: &str, is_admin: bool) -> String {
    AuthService::new(&config.auth)
        .issue_token(account_id, is_admin, chrono::Duration::hours(1))
        .unwrap()
}

#[tokio::test]
async fn test_owned_link_is_hidden_from_other_accounts() {
    let config = jwt_config();
    let app = test_app(&config).await;
    let router = router(&app);

    let alice = token(&config, "alice", false);
    let bob = token(&config, "bob", false);
    let root = token(&config, "root", true);

    let code = create_link(&router, "https://example.com/alice", Some(&alice)).await;
    let stats_uri = format!("/api/urls/{code}/stats");

    assert_eq!(
        send(&router, get(&stats_uri, Some(&alice))).await.status,
        StatusCode::OK
    );
    assert_eq!(
        send(&router, get(&stats_uri, Some(&root))).await.status,
        StatusCode::OK
    );

    // Someone else's link looks exactly like a missing one
    let foreign = send(&router, get(&stats_uri, Some(&bob))).await;
    let missing = send(&router, get("/api/urls/absent/stats", Some(&bob))).await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);
    assert_eq!(foreign.body, missing.body);

    assert_eq!(
        send(&router, get(&stats_uri, None)).await.status,
        StatusCode::UNAUTHORIZED
    );

    let response = send(&router, delete(&format!("/api/urls/{code}"), Some(&bob))).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    // Still redirects for everyone
    let response = send(&router, get(&format!("/{code}"), None)).await;
    assert_eq!(response.status, StatusCode::FOUND);

    let response = send(&router, delete(&format!("/api/urls/{code}"), Some(&alice))).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_listing_is_scoped_to_caller() {
    let config = jwt_config();
    let app = test_app(&config).await;
    let router = router(&app);

    let alice = token(&config, "alice", false);
    let bob = token(&config, "bob", false);

    let code = create_link(&router, "https://example.com/a", Some(&alice)).await;
    create_link(&router, "https://example.com/b", Some(&bob)).await;

    let listing = send(&router, get("/api/urls", Some(&alice))).await;
    assert_eq!(listing.status, StatusCode::OK);
    let links = listing.json();
    let links = links.as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["short_code"], code.as_str());
    assert_eq!(links[0]["owner_id"], "alice");

    assert_eq!(
        send(&router, get("/api/urls", None)).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_anonymous_links_are_public_but_admin_deletable() {
    let config = jwt_config();
    let app = test_app(&config).await;
    let router = router(&app);

    let code = create_link(&router, "https://example.com", None).await;

    let response = send(&router, get(&format!("/api/urls/{code}/stats"), None)).await;
    assert_eq!(response.status, StatusCode::OK);

    let bob = token(&config, "bob", false);
    let response = send(&router, delete(&format!("/api/urls/{code}"), Some(&bob))).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let root = token(&config, "root", true);
    let response = send(&router, delete(&format!("/api/urls/{code}"), Some(&root))).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_tokens_are_rejected() {
    let config = jwt_config();
    let app = test_app(&config).await;
    let router = router(&app);

    let response = send(
        &router,
        post_json(
            "/api/urls",
            json!({ "original_url": "https://example.com" }),
            Some("not-a-jwt"),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let mut other = config.clone();
    other.auth.jwt_secret = Some("some-other-secret".to_string());
    let forged = token(&other, "alice", true);
    let response = send(&router, get("/api/admin/stats", Some(&forged))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_endpoints_require_admin() {
    let config = jwt_config();
    let app = test_app(&config).await;
    let router = router(&app);

    let alice = token(&config, "alice", false);
    let root = token(&config, "root", true);
    create_link(&router, "https://example.com/1", Some(&alice)).await;
    create_link(&router, "https://example.com/2", Some(&alice)).await;

    for uri in [
        "/api/admin/stats",
        "/api/admin/users",
        "/api/admin/users/alice/links",
        "/api/admin/export",
    ] {
        assert_eq!(
            send(&router, get(uri, Some(&alice))).await.status,
            StatusCode::FORBIDDEN,
            "{uri}"
        );
        assert_eq!(
            send(&router, get(uri, None)).await.status,
            StatusCode::UNAUTHORIZED,
            "{uri}"
        );
    }
    let response = send(&router, post_json("/api/urls/cleanup", json!({}), Some(&alice))).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let totals = send(&router, get("/api/admin/stats", Some(&root))).await.json();
    assert_eq!(totals["total_users"], 1);
    assert_eq!(totals["total_links"], 2);

    let users = send(&router, get("/api/admin/users", Some(&root))).await.json();
    assert_eq!(users[0]["account_id"], "alice");
    assert_eq!(users[0]["links_count"], 2);

    let links = send(&router, get("/api/admin/users/alice/links", Some(&root)))
        .await
        .json();
    assert_eq!(links.as_array().unwrap().len(), 2);

    let export = send(&router, get("/api/admin/export", Some(&root))).await;
    assert_eq!(export.status, StatusCode::OK);
    let bundle = export.json();
    assert_eq!(bundle["urls"].as_array().unwrap().len(), 2);
    assert_eq!(bundle["users"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_export_accepts_query_token() {
    let config = jwt_config();
    let app = test_app(&config).await;
    let router = router(&app);

    let alice = token(&config, "alice", false);
    let code = create_link(&router, "https://example.com", Some(&alice)).await;

    let response = send(
        &router,
        get(&format!("/api/urls/{code}/export?token={alice}"), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text().starts_with("section,value,count"));

    // Only download endpoints read the query string
    let response = send(
        &router,
        get(&format!("/api/urls/{code}/stats?token={alice}"), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}
