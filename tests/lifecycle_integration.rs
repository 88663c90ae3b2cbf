//! Link lifecycle integration tests
//!
//! Create, resolve, expire, sweep and delete links through the full router
//! on an in-memory SQLite store.

mod common;

use axum::http::{header, StatusCode};
use serde_json::json;
use snip::config::{Config, RetentionPolicy};
use snip::models::NewLink;
use snip::storage::Storage;

use common::{create_link, delete, get, post_json, router, send, test_app};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[tokio::test]
async fn test_create_then_redirect() {
    let app = test_app(&Config::for_testing()).await;
    let router = router(&app);

    let response = send(
        &router,
        post_json(
            "/api/urls",
            json!({ "original_url": "https://example.com/destination", "expires_in": "1h" }),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let body = response.json();
    let code = body["short_code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert_eq!(body["short_url"], format!("http://localhost:8080/{code}"));
    let expires_at = body["expires_at"].as_i64().unwrap();
    assert!((expires_at - now() - 3600).abs() <= 5);

    let redirect = send(&router, get(&format!("/{code}"), None)).await;
    assert_eq!(redirect.status, StatusCode::FOUND);
    assert_eq!(
        redirect.headers[header::LOCATION],
        "https://example.com/destination"
    );
    assert_eq!(redirect.headers[header::CACHE_CONTROL], "no-store");
    assert!(redirect.headers.contains_key("x-snip-timing-total-ms"));

    app.shutdown().await;
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let app = test_app(&Config::for_testing()).await;
    let router = router(&app);

    let response = send(&router, get("/nope42", None)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.text(), "Short link not found");
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app(&Config::for_testing()).await;
    let response = send(&router(&app), get("/health", None)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "OK");
}

#[tokio::test]
async fn test_expired_link_stops_resolving_before_sweep() {
    let app = test_app(&Config::for_testing()).await;
    let router = router(&app);

    app.storage
        .insert_link(&NewLink {
            short_code: "stale1".to_string(),
            original_url: "https://example.com/old".to_string(),
            owner_id: None,
            created_at: now() - 7200,
            expires_at: Some(now() - 10),
        })
        .await
        .unwrap();

    // Unreachable even though the sweeper has not run
    let response = send(&router, get("/stale1", None)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let cleanup = send(&router, post_json("/api/urls/cleanup", json!({}), None)).await;
    assert_eq!(cleanup.status, StatusCode::OK);
    let report = cleanup.json();
    assert_eq!(report["expired"], 1);
    assert_eq!(report["purged"], 0);

    // Soft retention keeps the row around, inactive
    let link = app.storage.get("stale1").await.unwrap().unwrap();
    assert!(!link.is_active);
    assert!(link.deactivated_at.is_some());

    let response = send(&router, get("/stale1", None)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hard_retention_purges_on_cleanup() {
    let mut config = Config::for_testing();
    config.sweeper.policy = RetentionPolicy::Hard;
    let app = test_app(&config).await;
    let router = router(&app);

    app.storage
        .insert_link(&NewLink {
            short_code: "gone42".to_string(),
            original_url: "https://example.com/".to_string(),
            owner_id: None,
            created_at: now() - 100,
            expires_at: Some(now() - 1),
        })
        .await
        .unwrap();
    let live = create_link(&router, "https://example.com/live", None).await;

    let cleanup = send(&router, post_json("/api/urls/cleanup", json!({}), None)).await;
    assert_eq!(cleanup.status, StatusCode::OK);
    assert_eq!(cleanup.json()["purged"], 1);

    assert!(app.storage.get("gone42").await.unwrap().is_none());
    assert!(app.storage.get(&live).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_removes_link() {
    let app = test_app(&Config::for_testing()).await;
    let router = router(&app);

    let keep = create_link(&router, "https://example.com/keep", None).await;
    let doomed = create_link(&router, "https://example.com/doomed", None).await;

    // Resolve once so the cache holds it
    let response = send(&router, get(&format!("/{doomed}"), None)).await;
    assert_eq!(response.status, StatusCode::FOUND);

    let response = send(&router, delete(&format!("/api/urls/{doomed}"), None)).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = send(&router, get(&format!("/{doomed}"), None)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let listing = send(&router, get("/api/urls", None)).await;
    assert_eq!(listing.status, StatusCode::OK);
    let codes: Vec<String> = listing
        .json()
        .as_array()
        .unwrap()
        .iter()
        .map(|link| link["short_code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes, vec![keep]);

    let response = send(&router, delete(&format!("/api/urls/{doomed}"), None)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn test_custom_code_conflict() {
    let app = test_app(&Config::for_testing()).await;
    let router = router(&app);

    let body = json!({ "original_url": "https://example.com", "custom_code": "my-link" });
    let first = send(&router, post_json("/api/urls", body.clone(), None)).await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.json()["short_code"], "my-link");

    let second = send(&router, post_json("/api/urls", body, None)).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert!(second.json()["error"].is_string());
}

#[tokio::test]
async fn test_validation_errors() {
    let app = test_app(&Config::for_testing()).await;
    let router = router(&app);

    let bad_bodies = [
        json!({ "original_url": "" }),
        json!({ "original_url": "not a url" }),
        json!({ "original_url": "ftp://example.com/file" }),
        json!({ "original_url": "https://example.com", "expires_in": "1y" }),
        json!({ "original_url": "https://example.com", "custom_code": "ab" }),
        json!({ "original_url": "https://example.com", "custom_code": "has space" }),
        json!({ "original_url": "https://example.com", "custom_code": "api" }),
        json!({ "expires_in": "1h" }),
    ];

    for body in bad_bodies {
        let response = send(&router, post_json("/api/urls", body.clone(), None)).await;
        assert_eq!(
            response.status,
            StatusCode::BAD_REQUEST,
            "{body} should be rejected"
        );
        assert!(response.json()["error"].is_string());
    }

    // Inverted stats window
    let code = create_link(&router, "https://example.com", None).await;
    let response = send(
        &router,
        get(&format!("/api/urls/{code}/stats?from=200&to=100"), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_for_new_link_are_empty() {
    let app = test_app(&Config::for_testing()).await;
    let router = router(&app);

    let code = create_link(&router, "https://example.com", None).await;
    let response = send(&router, get(&format!("/api/urls/{code}/stats"), None)).await;
    assert_eq!(response.status, StatusCode::OK);

    let stats = response.json();
    assert_eq!(stats["total_visits"], 0);
    assert_eq!(stats["daily_visits"], json!([]));
    assert_eq!(stats["top_referers"], json!([]));
    assert_eq!(stats["top_user_agents"], json!([]));

    let response = send(&router, get("/api/urls/missing/stats", None)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_visits_show_up_in_stats_and_export() {
    let app = test_app(&Config::for_testing()).await;
    let router = router(&app);
    let code = create_link(&router, "https://example.com", None).await;

    let visits = [
        (Some("https://news.example/"), "agent-a"),
        (Some("https://news.example/"), "agent-b"),
        (None, "agent-a"),
    ];
    for (referer, agent) in visits {
        let mut request = get(&format!("/{code}"), None);
        request
            .headers_mut()
            .insert(header::USER_AGENT, agent.parse().unwrap());
        if let Some(referer) = referer {
            request
                .headers_mut()
                .insert(header::REFERER, referer.parse().unwrap());
        }
        assert_eq!(send(&router, request).await.status, StatusCode::FOUND);
    }
    app.recorder().flush().await;

    let stats = send(&router, get(&format!("/api/urls/{code}/stats"), None))
        .await
        .json();
    assert_eq!(stats["total_visits"], 3);
    assert_eq!(
        stats["top_referers"],
        json!([{ "url": "https://news.example/", "count": 2 }])
    );
    assert_eq!(
        stats["top_user_agents"],
        json!([{ "name": "agent-a", "count": 2 }, { "name": "agent-b", "count": 1 }])
    );
    let daily_total: i64 = stats["daily_visits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|day| day["count"].as_i64().unwrap())
        .sum();
    assert_eq!(daily_total, 3);

    let export = send(&router, get(&format!("/api/urls/{code}/export"), None)).await;
    assert_eq!(export.status, StatusCode::OK);
    assert!(export.headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let csv = export.text();
    assert!(csv.starts_with("section,value,count"));
    assert!(csv.contains("referer,https://news.example/,2"));
    assert!(csv.contains("user_agent,agent-b,1"));

    app.shutdown().await;
}

#[tokio::test]
async fn test_dashboard_counts_own_links() {
    let app = test_app(&Config::for_testing()).await;
    let router = router(&app);

    let code = create_link(&router, "https://example.com/a", None).await;
    create_link(&router, "https://example.com/b", None).await;
    send(&router, get(&format!("/{code}"), None)).await;
    app.recorder().flush().await;

    let response = send(&router, get("/api/dashboard", None)).await;
    assert_eq!(response.status, StatusCode::OK);
    let dashboard = response.json();
    assert_eq!(dashboard["total_links"], 2);
    assert_eq!(dashboard["active_links"], 2);
    assert_eq!(dashboard["total_visits"], 1);
    assert_eq!(dashboard["recent_links"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_account_endpoints_are_not_implemented() {
    let app = test_app(&Config::for_testing()).await;
    let router = router(&app);

    let response = send(&router, post_json("/api/auth/login", json!({}), None)).await;
    assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
}
