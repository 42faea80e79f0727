//! Integration tests for the dashboard query cache.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use support::{can_bind_localhost, test_app};
use wander_core::dashboard::DashboardCache;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, Request, ResponseTemplate};

fn overview_body(total: u64) -> serde_json::Value {
    serde_json::json!({
        "total_trips": total,
        "total_distance_km": 123.4,
        "available_years": [2022, 2023, 2024]
    })
}

#[tokio::test]
async fn test_repeat_key_hits_cache() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let app = test_app().await;
    app.store.set_tokens("valid", "r");

    Mock::given(method("GET"))
        .and(path("/api/dashboard/overview/42/"))
        .and(query_param("year", "2023"))
        .respond_with(ResponseTemplate::new(200).set_body_json(overview_body(5)))
        .expect(1)
        .mount(&app.server)
        .await;

    let cache = DashboardCache::new();
    let first = cache
        .overview(&app.client, Some(42), Some(2023))
        .await
        .unwrap();
    let second = cache
        .overview(&app.client, Some(42), Some(2023))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.available_years(), vec![2022, 2023, 2024]);
}

#[tokio::test]
async fn test_distinct_years_are_distinct_keys() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let app = test_app().await;
    app.store.set_tokens("valid", "r");

    Mock::given(method("GET"))
        .and(path("/api/dashboard/overview/42/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(overview_body(5)))
        .expect(2)
        .mount(&app.server)
        .await;

    let cache = DashboardCache::new();
    cache
        .overview(&app.client, Some(42), Some(2023))
        .await
        .unwrap();
    cache
        .overview(&app.client, Some(42), Some(2024))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_own_dashboard_uses_me_key_and_plain_path() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let app = test_app().await;
    app.store.set_tokens("valid", "r");

    Mock::given(method("GET"))
        .and(path("/api/dashboard/overview/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(overview_body(9)))
        .expect(1)
        .mount(&app.server)
        .await;

    let cache = DashboardCache::new();
    let body = cache.overview(&app.client, None, None).await.unwrap();
    assert_eq!(body["total_trips"], 9);
    // Same implicit key again: still one request.
    cache.overview(&app.client, None, None).await.unwrap();
}

#[tokio::test]
async fn test_clear_forces_refetch() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let app = test_app().await;
    app.store.set_tokens("valid", "r");

    Mock::given(method("GET"))
        .and(path("/api/dashboard/overview/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(overview_body(9)))
        .expect(2)
        .mount(&app.server)
        .await;

    let cache = DashboardCache::new();
    cache.overview(&app.client, None, None).await.unwrap();
    cache.clear();
    cache.overview(&app.client, None, None).await.unwrap();
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let app = test_app().await;
    app.store.set_tokens("valid", "r");

    // First call fails, second succeeds: the failure must not poison the key.
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    Mock::given(method("GET"))
        .and(path("/api/dashboard/overview/"))
        .respond_with(move |_req: &Request| {
            if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(502).set_body_string("bad gateway")
            } else {
                ResponseTemplate::new(200).set_body_json(overview_body(3))
            }
        })
        .expect(2)
        .mount(&app.server)
        .await;

    let cache = DashboardCache::new();
    let err = cache.overview(&app.client, None, None).await.unwrap_err();
    assert_eq!(err.status_code(), Some(502));

    let body = cache.overview(&app.client, None, None).await.unwrap();
    assert_eq!(body["total_trips"], 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
