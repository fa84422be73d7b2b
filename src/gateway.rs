//! Gateway router and admission pipeline
//!
//! Fixed routes: the challenge verification endpoint and the login surface.
//! Everything else falls through to the pipeline handler, which runs the
//! stages in order: auth gate, honeypot, anomaly gate, WAF, route
//! resolution, cache lookup, proxy.
//!
//! The error path serves verified clients the configured static page and
//! everyone else a rendered challenge page.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Form, State};
use axum::http::{header, HeaderValue, Method, Request, Response, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{any, get, post};
use axum::Router;
use http_body_util::BodyExt;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::anomaly::AnomalyDetector;
use crate::auth;
use crate::cache::{cache_key, ResponseCache};
use crate::challenge::{calculate_suspicion, kind_for_suspicion, ChallengeKind, ChallengeStore};
use crate::config::GatewayConfig;
use crate::database::Store;
use crate::envelope::{client_ip, RequestEnvelope};
use crate::error::GatewayError;
use crate::error_pages::{is_html, ErrorPageStore};
use crate::honeypot;
use crate::overlay::{inject_overlay, AnalysisInfo};
use crate::proxy::UpstreamClient;
use crate::render::{render_dynamic_error_page, VERIFY_ENDPOINT};
use crate::streaming::Manager;
use crate::waf::{Decision, WafEngine};

/// Shared state threaded through every handler
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<Store>,
    pub challenges: Arc<ChallengeStore>,
    pub cache: Option<Arc<ResponseCache>>,
    pub waf: Arc<WafEngine>,
    pub manager: Arc<Manager>,
    pub detector: Option<Arc<AnomalyDetector>>,
    pub pages: Arc<ErrorPageStore>,
    pub upstream: UpstreamClient,
}

/// Build the gateway router
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route(VERIFY_ENDPOINT, post(verify_handler))
        .route("/login", get(login_page).post(login_submit))
        .fallback(any(pipeline_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct VerifyForm {
    #[serde(default)]
    challenge_id: String,
    #[serde(default)]
    answer: String,
}

/// `POST /__netgoat/verify`: challenge answers from the rendered pages
async fn verify_handler(
    State(state): State<GatewayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    Form(form): Form<VerifyForm>,
) -> Response<Body> {
    let ip = client_ip(&headers, peer);

    if state
        .challenges
        .verify(&form.challenge_id, &form.answer, &ip)
    {
        info!(ip = %ip, challenge_id = %form.challenge_id, "Challenge verified successfully");
        let referer = headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("/");
        let location = HeaderValue::from_str(referer)
            .unwrap_or_else(|_| HeaderValue::from_static("/"));
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::FOUND;
        response.headers_mut().insert(header::LOCATION, location);
        response
    } else {
        warn!(ip = %ip, challenge_id = %form.challenge_id, "Challenge verification failed");
        let error = GatewayError::ChallengeFailed;
        (error.status(), "Verification failed. Please try again.").into_response()
    }
}

async fn login_page() -> Html<&'static str> {
    Html(auth::LOGIN_PAGE)
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login_submit(
    State(state): State<GatewayState>,
    Form(form): Form<LoginForm>,
) -> Response<Body> {
    match auth::login(&state.store, &form.username, &form.password) {
        Some(token) => {
            let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", auth::AUTH_COOKIE, token);
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::FOUND;
            response
                .headers_mut()
                .insert(header::LOCATION, HeaderValue::from_static("/"));
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            response
        }
        None => (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response(),
    }
}

/// The admission pipeline, run for every path without a fixed route
async fn pipeline_handler(
    State(state): State<GatewayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let scheme = if state.config.ssl.enabled { "https" } else { "http" };
    let env = RequestEnvelope::from_parts(&parts.method, &parts.uri, &parts.headers, peer, scheme);

    let mut analysis = AnalysisInfo::new(
        &env.client_ip,
        &env.host,
        &env.path,
        &env.method,
        state.config.anomaly.effective_threshold(),
    );
    analysis.ai_enabled = state.detector.is_some();

    // Auth gate
    if state.config.auth.enabled {
        let result = auth::check(&state.store, &env.headers);
        if !result.authenticated {
            let wants_json = env
                .headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .map_or(false, |accept| accept.contains("application/json"));
            if wants_json {
                return write_error(&state, &env, StatusCode::UNAUTHORIZED, "Unauthorized");
            }
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::FOUND;
            response
                .headers_mut()
                .insert(header::LOCATION, HeaderValue::from_static("/login"));
            return response;
        }
        if result.zero_trust_required && state.store.zero_trust_enabled() {
            debug!(user = %result.username, "User requires zero-trust challenge");
        }
    }

    // Honeypot trap
    if state.config.honeypot {
        if let Some(bait) = honeypot::check(&env.path) {
            warn!(ip = %env.client_ip, path = %env.path, "Honeypot triggered");
            let mut response = Response::new(Body::from(bait.body));
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            return response;
        }
    }

    // Anomaly gate, only when a feature vector is present
    if let Some(detector) = &state.detector {
        let csv = feature_vector(&state.config, &env);
        if let Some(csv) = csv {
            analysis.ai_checked = true;
            let started = std::time::Instant::now();
            match detector.predict_csv(&csv).await {
                Ok((label, score)) => {
                    analysis.ai_processing_ms = started.elapsed().as_millis();
                    analysis.ai_label = label.clone();
                    analysis.ai_score = score;
                    info!(label = %label, score, "Anomaly prediction");
                    if detector.is_anomalous(&label, score) {
                        analysis.ai_blocked = true;
                        analysis.request_allowed = false;
                        analysis.block_reason =
                            format!("AI detected high-risk: {} ({:.1}%)", label, score * 100.0);
                        warn!(
                            label = %label,
                            score,
                            ip = %env.client_ip,
                            path = %env.path,
                            "Blocked by anomaly detector"
                        );
                        return write_error(&state, &env, StatusCode::FORBIDDEN, "Forbidden");
                    }
                }
                Err(e) => {
                    // Timeouts and pipe errors are "no signal"
                    analysis.ai_processing_ms = started.elapsed().as_millis();
                    analysis.ai_error = e.to_string();
                    warn!(error = %e, "Anomaly detection error");
                }
            }
        }
    }

    // WAF; store failure is fail-open
    analysis.waf_checked = true;
    let decision = match state.store.waf_rules() {
        Ok(rules) => state.waf.evaluate(
            &env,
            &rules,
            state.manager.version(),
            state.config.debug_logs,
        ),
        Err(e) => {
            warn!(error = %e, "WAF rule store unavailable; failing open");
            Decision::Pass
        }
    };
    if let Decision::Block { rule } = decision {
        analysis.waf_blocked = true;
        analysis.waf_rule_name = rule.clone();
        analysis.request_allowed = false;
        analysis.block_reason = format!("WAF rule triggered: {}", rule);
        warn!(rule = %rule, ip = %env.client_ip, host = %env.host, "Request blocked by WAF");
        return write_error(&state, &env, StatusCode::FORBIDDEN, "Forbidden");
    }

    // Route resolution
    let target = match state.store.resolve_target(&env.host, &env.path) {
        Ok(Some(target)) => target,
        Ok(None) => {
            warn!(host = %env.host, path = %env.path, "No route found for domain or path");
            return write_error(&state, &env, StatusCode::NOT_FOUND, "No route found");
        }
        Err(e) => {
            warn!(error = %e, host = %env.host, "Route store unavailable");
            return write_error(
                &state,
                &env,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            );
        }
    };

    info!(
        host = %env.host,
        path = %env.path,
        target = %target,
        method = %env.method,
        "Route resolved"
    );
    analysis.target_url = target.clone();

    if env.is_upgrade() {
        info!(client = %env.client_ip, host = %env.host, "Upgrade request detected");
    }

    // Cache lookup for safe methods
    let cacheable = state.cache.is_some() && env.method == "GET" && !env.is_upgrade();
    let key = cacheable.then(|| cache_key(&env));

    if let (Some(cache), Some(key)) = (&state.cache, &key) {
        if let Some(hit) = cache.get(key) {
            analysis.cache_hit = true;
            let mut response = Response::new(Body::empty());
            *response.status_mut() = hit.status;
            *response.headers_mut() = hit.headers.clone();
            response
                .headers_mut()
                .insert("x-cache", HeaderValue::from_static("HIT"));

            let is_html_response = hit
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map_or(false, |ct| ct.contains("text/html"));
            if state.config.debug_overlay && is_html_response {
                if let Some(injected) = inject_overlay(&hit.body, &analysis) {
                    *response.body_mut() = Body::from(injected);
                    response.headers_mut().remove(header::CONTENT_LENGTH);
                    return response;
                }
            }
            *response.body_mut() = Body::from(hit.body.clone());
            return response;
        }
    }

    // Proxy to the upstream; the overlay path buffers HTML, so skip the tee
    // there and let the cache fill on a non-overlay request.
    let method: Method = env.method.parse().unwrap_or(Method::GET);
    let tee = match (&state.cache, &key) {
        (Some(cache), Some(key)) => Some((Arc::clone(cache), key.clone())),
        _ => None,
    };

    match state.upstream.forward(&env, method, body, &target, tee).await {
        Ok(response) => {
            if state.config.debug_overlay {
                return overlay_response(response, &analysis).await;
            }
            response
        }
        Err(e @ GatewayError::InvalidUpstream(_)) => {
            error!(error = %e, host = %env.host, "Invalid target URL in store");
            write_error(
                &state,
                &env,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            )
        }
        Err(e) => {
            // Transport failures pass through as a plain 502
            (e.status(), format!("Upstream error: {}", e)).into_response()
        }
    }
}

/// Error path: static page for verified clients, challenge page otherwise
pub fn write_error(
    state: &GatewayState,
    env: &RequestEnvelope,
    status: StatusCode,
    fallback: &str,
) -> Response<Body> {
    if state.challenges.is_verified(&env.client_ip) {
        if let Some(page) = state.pages.pick(&env.host, &env.path) {
            if is_html(page) {
                let mut response = Response::new(Body::from(page.to_vec()));
                *response.status_mut() = status;
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=utf-8"),
                );
                return response;
            }
        }
        return (status, fallback.to_string()).into_response();
    }

    let suspicion = calculate_suspicion(&env.user_agent, &env.client_ip);
    let kind = kind_for_suspicion(suspicion);

    info!(
        ip = %env.client_ip,
        user_agent = %env.user_agent,
        suspicion,
        challenge_type = kind.as_str(),
        "Generating dynamic error page"
    );

    let challenge = (kind != ChallengeKind::None)
        .then(|| state.challenges.create(&env.client_ip, &env.user_agent, suspicion, kind));

    let html = render_dynamic_error_page(challenge.as_ref(), status.as_u16(), fallback);
    let mut response = Response::new(Body::from(html));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Pull the CSV feature vector from the configured header or the `goatai`
/// query parameter
fn feature_vector(config: &GatewayConfig, env: &RequestEnvelope) -> Option<String> {
    let header_name = config.anomaly.effective_feature_header();
    if let Some(value) = env.headers.get(header_name).and_then(|v| v.to_str().ok()) {
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    for pair in env.raw_query.split('&') {
        if let Some(value) = pair.strip_prefix("goatai=") {
            if !value.is_empty() {
                return Some(url_decode(value));
            }
        }
    }
    None
}

/// Minimal percent-decoding for query parameter values
fn url_decode(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let hex: String = chars.by_ref().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) => result.push(byte as char),
                    Err(_) => {
                        result.push('%');
                        result.push_str(&hex);
                    }
                }
            }
            '+' => result.push(' '),
            other => result.push(other),
        }
    }
    result
}

/// Inject the overlay into an HTML response, buffering its body
async fn overlay_response(response: Response<Body>, analysis: &AnalysisInfo) -> Response<Body> {
    let is_html_response = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.contains("text/html"));
    if !is_html_response {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "Failed to buffer response for overlay injection");
            return Response::from_parts(parts, Body::empty());
        }
    };

    match inject_overlay(&bytes, analysis) {
        Some(injected) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(injected))
        }
        None => Response::from_parts(parts, Body::from(bytes)),
    }
}
