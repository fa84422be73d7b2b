//! Normalized request envelope
//!
//! One immutable view of the incoming request, built by the pipeline driver
//! and handed to every stage. Host and client IP are normalized once here so
//! no stage re-derives them differently.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, Method, Uri};

/// Normalized view of an HTTP request, immutable for the request's lifetime
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    /// HTTP method, e.g. "GET"
    pub method: String,
    /// Request scheme ("http" or "https")
    pub scheme: String,
    /// Host, lowercased with any port stripped
    pub host: String,
    /// URL path
    pub path: String,
    /// Raw query string (no leading '?', empty when absent)
    pub raw_query: String,
    /// Client IP: first `X-Forwarded-For` token, else peer address
    pub client_ip: String,
    /// User-Agent header value (empty when absent)
    pub user_agent: String,
    /// Full request header map
    pub headers: HeaderMap,
}

impl RequestEnvelope {
    /// Build an envelope from request parts and the peer address
    pub fn from_parts(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        peer: SocketAddr,
        scheme: &str,
    ) -> Self {
        let host_raw = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        Self {
            method: method.as_str().to_string(),
            scheme: scheme.to_string(),
            host: normalize_host(host_raw),
            path: uri.path().to_string(),
            raw_query: uri.query().unwrap_or("").to_string(),
            client_ip: client_ip(headers, peer),
            user_agent,
            headers: headers.clone(),
        }
    }

    /// True when the request carries an `Upgrade` header (WebSocket etc.)
    pub fn is_upgrade(&self) -> bool {
        self.headers.contains_key(header::UPGRADE)
    }
}

/// Lowercase the host and strip a trailing `:port`
pub fn normalize_host(host: &str) -> String {
    let lowered = host.trim().to_ascii_lowercase();
    strip_port(&lowered).to_string()
}

/// Derive the client IP: first `X-Forwarded-For` token wins, else the peer
/// address with the port removed
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first = xff.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    peer.ip().to_string()
}

/// Strip a `:port` suffix, leaving bracketed IPv6 literals intact
fn strip_port(host: &str) -> &str {
    if let Some(end) = host.rfind(']') {
        // "[::1]:8080" -> "[::1]"
        return &host[..=end];
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "203.0.113.9:54321".parse().unwrap()
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Example.COM"), "example.com");
        assert_eq!(normalize_host("example.com:8080"), "example.com");
        assert_eq!(normalize_host("[::1]:8080"), "[::1]");
        assert_eq!(normalize_host(""), "");
    }

    #[test]
    fn test_client_ip_from_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.4, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer()), "198.51.100.4");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer()), "203.0.113.9");
    }

    #[test]
    fn test_from_parts() {
        let method = Method::GET;
        let uri: Uri = "/a/b?x=1&y=2".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("Svc.Example.com:443"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));

        let env = RequestEnvelope::from_parts(&method, &uri, &headers, peer(), "https");
        assert_eq!(env.method, "GET");
        assert_eq!(env.scheme, "https");
        assert_eq!(env.host, "svc.example.com");
        assert_eq!(env.path, "/a/b");
        assert_eq!(env.raw_query, "x=1&y=2");
        assert_eq!(env.client_ip, "203.0.113.9");
        assert_eq!(env.user_agent, "curl/8.0");
        assert!(!env.is_upgrade());
    }

    #[test]
    fn test_upgrade_detection() {
        let method = Method::GET;
        let uri: Uri = "/ws".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        let env = RequestEnvelope::from_parts(&method, &uri, &headers, peer(), "http");
        assert!(env.is_upgrade());
    }
}
