//! Pre-built key resolvers for common patterns.
//!
//! These resolvers are generic and can work with any request type
//! that provides the necessary data through traits. Implementations for
//! `http::request::Parts` are provided with the `axum` feature.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::{RateLimitError, Result};
use crate::key::Key;
use crate::strategy::BoxFuture;

// ============================================================================
// Request Info Traits
// ============================================================================

/// Trait for requests that have an IP address.
pub trait HasIpAddr {
    /// Get the client IP address.
    fn client_ip(&self) -> Option<IpAddr>;
}

/// Trait for requests that have a path.
pub trait HasPath {
    /// Get the request path.
    fn path(&self) -> &str;
}

/// Trait for requests that have a method.
pub trait HasMethod {
    /// Get the request method (GET, POST, etc).
    fn method(&self) -> &str;
}

/// Trait for requests that have headers.
pub trait HasHeaders {
    /// Get a header value by name.
    fn header(&self, name: &str) -> Option<&str>;
}

/// Trait for requests that know which route pattern they matched.
pub trait HasRoute {
    /// Get the matched route pattern (e.g. `/users/{id}`).
    fn matched_route(&self) -> Option<&str>;
}

fn ready(value: String) -> BoxFuture<'static, Result<String>> {
    Box::pin(std::future::ready(Ok(value)))
}

// ============================================================================
// IP-based Resolvers
// ============================================================================

/// Address used when the client address is unknown.
pub const FALLBACK_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Resolve the client IP address.
///
/// Falls back to `127.0.0.1` when no address is available, so requests
/// without connection info share one bucket instead of failing.
#[derive(Debug, Clone, Default)]
pub struct IpKey {
    /// Header to check for real IP (e.g., X-Forwarded-For).
    real_ip_header: Option<&'static str>,
}

impl IpKey {
    /// Create a new IP key resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use X-Forwarded-For header to get real IP behind proxy.
    pub fn with_forwarded_for() -> Self {
        Self {
            real_ip_header: Some("x-forwarded-for"),
        }
    }

    /// Use X-Real-IP header.
    pub fn with_real_ip() -> Self {
        Self {
            real_ip_header: Some("x-real-ip"),
        }
    }

    /// Use a custom header for real IP.
    pub fn with_header(header: &'static str) -> Self {
        Self {
            real_ip_header: Some(header),
        }
    }

    fn ip_of<R: HasIpAddr + HasHeaders>(&self, request: &R) -> String {
        let forwarded = self
            .real_ip_header
            .and_then(|header| request.header(header))
            // X-Forwarded-For might have multiple IPs, take the first
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        match forwarded {
            Some(ip) => ip.to_string(),
            None => request.client_ip().unwrap_or(FALLBACK_IP).to_string(),
        }
    }
}

impl<R> Key<R> for IpKey
where
    R: HasIpAddr + HasHeaders + Sync,
{
    fn resolve<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<String>> {
        ready(self.ip_of(request))
    }

    fn name(&self) -> &str {
        "ip"
    }
}

// ============================================================================
// Path-based Resolvers
// ============================================================================

/// Resolve the request path.
#[derive(Debug, Clone, Default)]
pub struct PathKey;

impl PathKey {
    /// Create a new path key resolver.
    pub fn new() -> Self {
        Self
    }
}

impl<R: HasPath + Sync> Key<R> for PathKey {
    fn resolve<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<String>> {
        ready(request.path().to_string())
    }

    fn name(&self) -> &str {
        "path"
    }
}

// ============================================================================
// Header-based Resolvers
// ============================================================================

/// Resolve the value of a specific header.
///
/// A missing header is a resolver failure, not an empty fragment. Wrap in
/// [`OptionalKey`](crate::key::OptionalKey) to substitute a default instead.
#[derive(Debug, Clone)]
pub struct HeaderKey {
    header_name: &'static str,
}

impl HeaderKey {
    /// Create a new header key resolver.
    pub fn new(header_name: &'static str) -> Self {
        Self { header_name }
    }

    /// Resolve from the Authorization header.
    pub fn authorization() -> Self {
        Self::new("authorization")
    }

    /// Resolve from the X-API-Key header.
    pub fn api_key() -> Self {
        Self::new("x-api-key")
    }
}

impl<R: HasHeaders + Sync> Key<R> for HeaderKey {
    fn resolve<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<String>> {
        let value = request
            .header(self.header_name)
            .map(str::to_string)
            .ok_or_else(|| {
                let reason = format!("missing header {}", self.header_name);
                RateLimitError::key_extraction("header", reason)
            });
        Box::pin(std::future::ready(value))
    }

    fn name(&self) -> &str {
        self.header_name
    }
}

// ============================================================================
// Method-based Resolvers
// ============================================================================

/// Resolve the HTTP method.
#[derive(Debug, Clone, Default)]
pub struct MethodKey;

impl MethodKey {
    /// Create a new method key resolver.
    pub fn new() -> Self {
        Self
    }
}

impl<R: HasMethod + Sync> Key<R> for MethodKey {
    fn resolve<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<String>> {
        ready(request.method().to_string())
    }

    fn name(&self) -> &str {
        "method"
    }
}

// ============================================================================
// Route-based Resolvers
// ============================================================================

/// Resolve the handler a request was routed to.
///
/// Unlike `PathKey`, this uses the route pattern (e.g., `GET /users/{id}`)
/// rather than the actual path (e.g., `/users/123`), so every request to one
/// handler lands in the same bucket. Falls back to the raw path when the
/// router did not record a pattern.
#[derive(Debug, Clone, Default)]
pub struct RouteKey;

impl RouteKey {
    /// Create a new route key resolver.
    pub fn new() -> Self {
        Self
    }
}

impl<R> Key<R> for RouteKey
where
    R: HasRoute + HasMethod + HasPath + Sync,
{
    fn resolve<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<String>> {
        let route = request.matched_route().unwrap_or_else(|| request.path());
        ready(format!("{} {}", request.method(), route))
    }

    fn name(&self) -> &str {
        "route"
    }
}

// ============================================================================
// http::request::Parts
// ============================================================================

#[cfg(feature = "axum")]
mod parts {
    use std::net::{IpAddr, SocketAddr};

    use axum::extract::{ConnectInfo, MatchedPath};
    use http::request::Parts;

    use super::{HasHeaders, HasIpAddr, HasMethod, HasPath, HasRoute};

    impl HasIpAddr for Parts {
        fn client_ip(&self) -> Option<IpAddr> {
            self.extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        }
    }

    impl HasPath for Parts {
        fn path(&self) -> &str {
            self.uri.path()
        }
    }

    impl HasMethod for Parts {
        fn method(&self) -> &str {
            self.method.as_str()
        }
    }

    impl HasHeaders for Parts {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).and_then(|v| v.to_str().ok())
        }
    }

    impl HasRoute for Parts {
        fn matched_route(&self) -> Option<&str> {
            self.extensions.get::<MatchedPath>().map(MatchedPath::as_str)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockRequest {
        ip: Option<IpAddr>,
        path: String,
        method: String,
        route: Option<String>,
        headers: HashMap<String, String>,
    }

    impl HasIpAddr for MockRequest {
        fn client_ip(&self) -> Option<IpAddr> {
            self.ip
        }
    }

    impl HasPath for MockRequest {
        fn path(&self) -> &str {
            &self.path
        }
    }

    impl HasMethod for MockRequest {
        fn method(&self) -> &str {
            &self.method
        }
    }

    impl HasHeaders for MockRequest {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).map(|s| s.as_str())
        }
    }

    impl HasRoute for MockRequest {
        fn matched_route(&self) -> Option<&str> {
            self.route.as_deref()
        }
    }

    #[tokio::test]
    async fn test_ip_key() {
        let key = IpKey::new();
        let req = MockRequest {
            ip: Some("192.168.1.1".parse().unwrap()),
            ..Default::default()
        };

        assert_eq!(key.resolve(&req).await.unwrap(), "192.168.1.1");
    }

    #[tokio::test]
    async fn test_ip_key_falls_back_to_localhost() {
        let key = IpKey::new();
        let req = MockRequest::default();

        assert_eq!(key.resolve(&req).await.unwrap(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_ip_key_with_forwarded_for() {
        let key = IpKey::with_forwarded_for();
        let mut req = MockRequest {
            ip: Some("10.0.0.1".parse().unwrap()),
            ..Default::default()
        };
        req.headers
            .insert("x-forwarded-for".into(), "203.0.113.50, 70.41.3.18".into());

        // Should use the first IP from X-Forwarded-For
        assert_eq!(key.resolve(&req).await.unwrap(), "203.0.113.50");
    }

    #[tokio::test]
    async fn test_path_and_method_keys() {
        let req = MockRequest {
            path: "/api/users/123".into(),
            method: "POST".into(),
            ..Default::default()
        };

        assert_eq!(PathKey::new().resolve(&req).await.unwrap(), "/api/users/123");
        assert_eq!(MethodKey::new().resolve(&req).await.unwrap(), "POST");
    }

    #[tokio::test]
    async fn test_header_key() {
        let key = HeaderKey::api_key();
        let mut req = MockRequest::default();

        let err = key.resolve(&req).await.unwrap_err();
        assert!(matches!(err, RateLimitError::KeyExtraction(_)));

        req.headers.insert("x-api-key".into(), "secret-key".into());
        assert_eq!(key.resolve(&req).await.unwrap(), "secret-key");
    }

    #[tokio::test]
    async fn test_route_key() {
        let key = RouteKey::new();
        let mut req = MockRequest {
            path: "/users/42".into(),
            method: "GET".into(),
            ..Default::default()
        };

        assert_eq!(key.resolve(&req).await.unwrap(), "GET /users/42");

        req.route = Some("/users/{id}".into());
        assert_eq!(key.resolve(&req).await.unwrap(), "GET /users/{id}");
    }
}
