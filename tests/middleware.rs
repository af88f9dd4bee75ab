//! Integration tests for the Axum middleware.

#![cfg(all(feature = "axum", feature = "memory", feature = "moving-window"))]

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{request::Parts, HeaderMap, Request, StatusCode},
    routing::get,
    Router,
};
use tower::ServiceExt;

use routelimit::key::HeaderKey;
use routelimit::middleware::{limit_all, limit_route, RateLimitLayer};
use routelimit::{
    ConfigError, LimitBuilder, Limiter, LimiterOptions, RateLimitError, StrategyKind,
};

/// Moving window counting, so assertions do not depend on where the
/// current fixed window happens to end.
fn layer(options: LimiterOptions) -> RateLimitLayer {
    let limiter = Limiter::<Parts>::builder()
        .ip_default_key()
        .options(LimiterOptions {
            strategy: StrategyKind::MovingWindow,
            ..options
        })
        .build()
        .unwrap();
    RateLimitLayer::new(limiter)
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: serde_json::Value,
}

async fn send(app: &Router, uri: &str) -> Reply {
    send_with(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn send_with(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    Reply { status, headers, body }
}

#[tokio::test]
async fn test_sixth_request_in_a_minute_is_rejected() {
    let app = Router::new()
        .route(
            "/items",
            limit_route(get(|| async { "items" }), "get_items", LimitBuilder::new("5/minute"))
                .unwrap(),
        )
        .layer(layer(LimiterOptions::default()));

    for _ in 0..5 {
        assert_eq!(send(&app, "/items").await.status, StatusCode::OK);
    }

    let reply = send(&app, "/items").await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        reply.body,
        serde_json::json!({ "error": "Rate limit exceeded: 5 per 1 minute" })
    );
    assert_eq!(reply.headers["content-type"], "application/json");
    assert_eq!(reply.headers["x-ratelimit-limit"], "5");
    assert_eq!(reply.headers["x-ratelimit-remaining"], "0");

    let retry_after: u64 = reply.headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn test_capacity_comes_back_after_the_window() {
    let app = Router::new()
        .route(
            "/search",
            limit_route(
                get(|| async { "results" }),
                "search",
                LimitBuilder::new("1/second").key("shared"),
            )
            .unwrap(),
        )
        .layer(layer(LimiterOptions::default()));

    assert_eq!(send(&app, "/search").await.status, StatusCode::OK);
    assert_eq!(send(&app, "/search").await.status, StatusCode::TOO_MANY_REQUESTS);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(send(&app, "/search").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_cancelled_request_consumes_nothing() {
    let handler = |headers: HeaderMap| async move {
        if headers.contains_key("x-stall") {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        "done"
    };
    let app = Router::new()
        .route(
            "/slow",
            limit_route(get(handler), "slow", LimitBuilder::new("1/minute")).unwrap(),
        )
        .layer(layer(LimiterOptions::default()));

    // The client goes away while the handler is still running
    let stalled = Request::builder()
        .uri("/slow")
        .header("x-stall", "1")
        .body(Body::empty())
        .unwrap();
    let abandoned = tokio::time::timeout(Duration::from_millis(50), send_with(&app, stalled)).await;
    assert!(abandoned.is_err());

    assert_eq!(send(&app, "/slow").await.status, StatusCode::OK);
    assert_eq!(send(&app, "/slow").await.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_override_key_shares_bucket_across_routes() {
    let limit = || LimitBuilder::new("3/minute").key("k").override_default_keys(true);

    let app = Router::new()
        .route("/a", limit_route(get(|| async { "a" }), "route_a", limit()).unwrap())
        .route("/b", limit_route(get(|| async { "b" }), "route_b", limit()).unwrap())
        .layer(layer(LimiterOptions::default()));

    assert_eq!(send(&app, "/a").await.status, StatusCode::OK);
    assert_eq!(send(&app, "/b").await.status, StatusCode::OK);
    assert_eq!(send(&app, "/a").await.status, StatusCode::OK);
    assert_eq!(send(&app, "/b").await.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(send(&app, "/a").await.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_routes_have_separate_buckets_by_default() {
    let limit = || LimitBuilder::new("1/minute");

    let app = Router::new()
        .route("/a", limit_route(get(|| async { "a" }), "route_a", limit()).unwrap())
        .route("/b", limit_route(get(|| async { "b" }), "route_b", limit()).unwrap())
        .layer(layer(LimiterOptions::default()));

    assert_eq!(send(&app, "/a").await.status, StatusCode::OK);
    assert_eq!(send(&app, "/b").await.status, StatusCode::OK);
    assert_eq!(send(&app, "/a").await.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_unmetered_without_limiter() {
    let app = Router::new().route(
        "/items",
        limit_route(get(|| async { "items" }), "get_items", LimitBuilder::new("1/minute")).unwrap(),
    );

    for _ in 0..5 {
        assert_eq!(send(&app, "/items").await.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_no_hit_status_codes() {
    let app = Router::new()
        .route(
            "/missing",
            limit_route(
                get(|| async { StatusCode::NOT_FOUND }),
                "missing",
                LimitBuilder::new("1/minute").no_hit_status_codes([404]),
            )
            .unwrap(),
        )
        .layer(layer(LimiterOptions::default()));

    for _ in 0..5 {
        assert_eq!(send(&app, "/missing").await.status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_resolver_failure_is_internal_error() {
    let app = Router::new()
        .route(
            "/items",
            limit_route(
                get(|| async { "items" }),
                "get_items",
                LimitBuilder::new("5/minute").key_resolver(HeaderKey::api_key()),
            )
            .unwrap(),
        )
        .layer(layer(LimiterOptions::default()));

    let reply = send(&app, "/items").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);

    let request = Request::builder()
        .uri("/items")
        .header("x-api-key", "key-1")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send_with(&app, request).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_rejection_options() {
    let app = Router::new()
        .route(
            "/items",
            limit_route(get(|| async { "items" }), "get_items", LimitBuilder::new("1/minute"))
                .unwrap(),
        )
        .layer(layer(
            LimiterOptions::default()
                .with_rejection_status(503)
                .with_expose_headers(false),
        ));

    send(&app, "/items").await;
    let reply = send(&app, "/items").await;

    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(reply.headers.get("retry-after").is_some());
    assert!(reply.headers.get("x-ratelimit-limit").is_none());
}

#[tokio::test]
async fn test_limit_all_buckets_each_route() {
    let router = Router::new()
        .route("/a", get(|| async { "a" }))
        .route("/b/{id}", get(|| async { "b" }));
    let app = limit_all(router, LimitBuilder::new("1/minute"))
        .unwrap()
        .layer(layer(LimiterOptions::default()));

    assert_eq!(send(&app, "/a").await.status, StatusCode::OK);
    assert_eq!(send(&app, "/a").await.status, StatusCode::TOO_MANY_REQUESTS);

    // Both paths match the same pattern
    assert_eq!(send(&app, "/b/1").await.status, StatusCode::OK);
    assert_eq!(send(&app, "/b/2").await.status, StatusCode::TOO_MANY_REQUESTS);
}

#[test]
fn test_limit_all_without_routes_fails_at_setup() {
    let err = limit_all(Router::<()>::new(), LimitBuilder::new("1/minute")).unwrap_err();
    assert!(matches!(
        err,
        RateLimitError::Config(ConfigError::MissingRequired(ref what)) if what == "routes"
    ));
}

#[test]
fn test_invalid_limit_fails_at_setup() {
    let result: routelimit::Result<axum::routing::MethodRouter> =
        limit_route(get(|| async { "items" }), "get_items", LimitBuilder::new("lots"));
    assert!(result.is_err());
}
