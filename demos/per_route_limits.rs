//! Per-route rate limiting example.
//!
//! Run with:
//! ```
//! cargo run --example per_route_limits --features memory,axum
//! ```

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use routelimit::prelude::*;
use tower::ServiceExt;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let app = Router::new()
        .route(
            "/api/search",
            limit_route(get(|| async { "results" }), "search", LimitBuilder::new("30/minute"))?,
        )
        .route(
            "/api/auth/login",
            limit_route(
                post(|| async { StatusCode::UNAUTHORIZED }),
                "login",
                LimitBuilder::new("5 per 15 minutes").key("auth"),
            )?,
        )
        .route(
            "/api/users/{id}",
            limit_route(
                get(|| async { StatusCode::NOT_FOUND }),
                "get_user",
                LimitBuilder::new("20/second").no_hit_status_codes([404]),
            )?,
        )
        .route("/api/data", get(|| async { "data" }))
        .layer(RateLimitLayer::memory()?);

    println!("=== Per-Route Rate Limiting Demo ===\n");

    let routes = [
        ("GET", "/api/data", 5),         // Not bound, never limited
        ("GET", "/api/search", 35),      // 30/min limit - should deny some
        ("POST", "/api/auth/login", 7),  // 5 per 15 min limit - should deny some
        ("GET", "/api/users/42", 25),    // 404s are not counted
    ];

    for (method, uri, count) in routes {
        println!("Route: {method} {uri} (sending {count} requests)");

        let mut passed = 0;
        let mut limited = 0;

        for _ in 0..count {
            let request = Request::builder().method(method).uri(uri).body(Body::empty())?;
            let response = app.clone().oneshot(request).await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                limited += 1;
            } else {
                passed += 1;
            }
        }

        println!("  Passed: {passed}, Limited: {limited}\n");
    }

    Ok(())
}
