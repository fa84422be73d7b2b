//! Upstream forwarding
//!
//! Streams the request to the resolved upstream and the reply back to the
//! client. The Host header is rewritten to the upstream authority, hop-by-hop
//! headers are dropped, and `X-Forwarded-*` headers are added. Cacheable 200
//! responses are teed into the response cache and marked `X-Cache: MISS`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, Uri};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, error};

use crate::cache::ResponseCache;
use crate::envelope::RequestEnvelope;
use crate::error::GatewayError;

/// Request headers never forwarded upstream
const HOP_BY_HOP_REQUEST: [&str; 9] = [
    "host",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// HTTP client for upstream connections
#[derive(Clone)]
pub struct UpstreamClient {
    http: Client<HttpConnector, Body>,
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClient {
    pub fn new() -> Self {
        let http = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_secs(90))
            .build_http();
        Self { http }
    }

    /// Forward the request to `target` and return the upstream response.
    /// With `cache` set, a 200 response is teed into the cache under the
    /// given key and marked `X-Cache: MISS`.
    pub async fn forward(
        &self,
        env: &RequestEnvelope,
        method: Method,
        body: Body,
        target: &str,
        cache: Option<(Arc<ResponseCache>, String)>,
    ) -> Result<Response<Body>, GatewayError> {
        let target_uri: Uri = target
            .parse()
            .map_err(|_| GatewayError::InvalidUpstream(target.to_string()))?;

        let scheme = target_uri.scheme_str().unwrap_or("");
        if scheme != "http" && scheme != "https" {
            return Err(GatewayError::InvalidUpstream(target.to_string()));
        }
        let authority = target_uri
            .authority()
            .ok_or_else(|| GatewayError::InvalidUpstream(target.to_string()))?
            .clone();

        let upstream_uri = build_upstream_uri(&target_uri, env)
            .map_err(|_| GatewayError::InvalidUpstream(target.to_string()))?;

        debug!(uri = %upstream_uri, "Proxying to upstream");

        let mut request = Request::builder()
            .method(method)
            .uri(&upstream_uri)
            .body(body)
            .map_err(|e| GatewayError::UpstreamFailure(e.to_string()))?;

        copy_request_headers(request.headers_mut(), &env.headers);

        // Rewrite Host to the upstream authority
        let host_value = HeaderValue::from_str(authority.as_str())
            .map_err(|_| GatewayError::InvalidUpstream(target.to_string()))?;
        request.headers_mut().insert(header::HOST, host_value);

        // Forwarding headers
        if let Ok(ip) = HeaderValue::from_str(&env.client_ip) {
            request.headers_mut().insert("x-real-ip", ip.clone());
            request.headers_mut().insert("x-forwarded-for", ip);
        }
        if let Ok(proto) = HeaderValue::from_str(&env.scheme) {
            request.headers_mut().insert("x-forwarded-proto", proto);
        }
        if let Ok(host) = HeaderValue::from_str(&env.host) {
            request.headers_mut().insert("x-forwarded-host", host);
        }

        let response = self.http.request(request).await.map_err(|e| {
            error!(target = %target, error = %e, "Upstream request failed");
            GatewayError::UpstreamFailure(e.to_string())
        })?;

        let (mut parts, incoming) = response.into_parts();

        // Tee cacheable 200 responses into the cache
        if let Some((cache, key)) = cache {
            if parts.status == axum::http::StatusCode::OK {
                let declared_len = parts
                    .headers
                    .get(header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<usize>().ok());

                // Bodies declared larger than the cache bound stream through
                if declared_len.map_or(true, |len| len <= cache.max_body_bytes()) {
                    let collected = incoming
                        .collect()
                        .await
                        .map_err(|e| GatewayError::UpstreamFailure(e.to_string()))?;
                    let bytes = collected.to_bytes();
                    cache.set(&key, parts.status, &parts.headers, &bytes);
                    parts
                        .headers
                        .insert("x-cache", HeaderValue::from_static("MISS"));
                    return Ok(Response::from_parts(parts, Body::from(bytes)));
                }
            }
        }

        Ok(Response::from_parts(parts, Body::new(incoming)))
    }
}

/// Join the target base with the request path and query
fn build_upstream_uri(target: &Uri, env: &RequestEnvelope) -> Result<Uri, axum::http::Error> {
    let base_path = target.path().trim_end_matches('/');
    let mut path_and_query = format!("{}{}", base_path, env.path);
    if !env.raw_query.is_empty() {
        path_and_query.push('?');
        path_and_query.push_str(&env.raw_query);
    }

    Uri::builder()
        .scheme(target.scheme_str().unwrap_or("http"))
        .authority(target.authority().map(|a| a.as_str()).unwrap_or(""))
        .path_and_query(path_and_query)
        .build()
        .map_err(Into::into)
}

/// Copy request headers, dropping the hop-by-hop set
fn copy_request_headers(dst: &mut HeaderMap, src: &HeaderMap) {
    for (name, value) in src {
        if HOP_BY_HOP_REQUEST.contains(&name.as_str()) {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(path: &str, query: &str) -> RequestEnvelope {
        RequestEnvelope {
            method: "GET".to_string(),
            scheme: "http".to_string(),
            host: "gateway.test".to_string(),
            path: path.to_string(),
            raw_query: query.to_string(),
            client_ip: "192.0.2.1".to_string(),
            user_agent: String::new(),
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn test_build_upstream_uri() {
        let target: Uri = "http://upstream:8080/".parse().unwrap();
        let uri = build_upstream_uri(&target, &envelope("/a/b", "x=1")).unwrap();
        assert_eq!(uri.to_string(), "http://upstream:8080/a/b?x=1");

        let uri = build_upstream_uri(&target, &envelope("/a", "")).unwrap();
        assert_eq!(uri.to_string(), "http://upstream:8080/a");
    }

    #[test]
    fn test_build_upstream_uri_with_base_path() {
        let target: Uri = "http://upstream:8080/base/".parse().unwrap();
        let uri = build_upstream_uri(&target, &envelope("/a", "")).unwrap();
        assert_eq!(uri.to_string(), "http://upstream:8080/base/a");
    }

    #[test]
    fn test_copy_headers_drops_hop_by_hop() {
        let mut src = HeaderMap::new();
        src.insert(header::HOST, HeaderValue::from_static("gateway.test"));
        src.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        src.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        src.insert("x-custom", HeaderValue::from_static("kept"));
        src.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        let mut dst = HeaderMap::new();
        copy_request_headers(&mut dst, &src);

        assert!(dst.get(header::HOST).is_none());
        assert!(dst.get(header::CONNECTION).is_none());
        assert!(dst.get(header::UPGRADE).is_none());
        assert_eq!(dst.get("x-custom").unwrap(), "kept");
        assert_eq!(dst.get(header::ACCEPT).unwrap(), "*/*");
    }

    #[tokio::test]
    async fn test_invalid_target_rejected() {
        let client = UpstreamClient::new();
        let env = envelope("/", "");
        let err = client
            .forward(&env, Method::GET, Body::empty(), "not a url", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidUpstream(_)));

        let err = client
            .forward(&env, Method::GET, Body::empty(), "ftp://x:21/", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidUpstream(_)));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_failure() {
        let client = UpstreamClient::new();
        let env = envelope("/", "");
        // Loopback port 1 refuses immediately
        let err = client
            .forward(
                &env,
                Method::GET,
                Body::empty(),
                "http://127.0.0.1:1/",
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamFailure(_)));
    }
}
