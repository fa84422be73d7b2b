//! Authentication gate and login surface
//!
//! Session-token authentication backed by the embedded store. The gate runs
//! before the admission pipeline when `auth.enabled` is set: a valid
//! `auth_token` cookie or Basic credentials pass, everything else is
//! redirected to `/login` (or given a JSON-friendly error page).

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::RngCore;
use tracing::warn;

use crate::database::{hash_password, Store};

/// Session cookie name
pub const AUTH_COOKIE: &str = "auth_token";

/// Result of the authentication gate
#[derive(Debug, Clone, Default)]
pub struct AuthResult {
    pub authenticated: bool,
    pub username: String,
    pub user_id: i64,
    /// Whether this user requires a zero-trust challenge
    pub zero_trust_required: bool,
    pub session_token: Option<String>,
}

/// Check a request against the session store. Cookie sessions are tried
/// first, then Basic credentials (which mint a new session on success).
pub fn check(store: &Arc<Store>, headers: &HeaderMap) -> AuthResult {
    let mut result = AuthResult::default();

    if let Some(token) = cookie_value(headers, AUTH_COOKIE) {
        match store.session_user(&token) {
            Ok(Some(user)) => {
                result.authenticated = true;
                result.username = user.username;
                result.user_id = user.id;
                result.zero_trust_required = user.zero_trust_enabled;
                result.session_token = Some(token);
                return result;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Session lookup failed");
            }
        }
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let Some(encoded) = auth_header.strip_prefix("Basic ") else {
        return result;
    };

    let Ok(decoded) = STANDARD.decode(encoded) else {
        return result;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return result;
    };
    let Some((username, password)) = pair.split_once(':') else {
        return result;
    };

    match store.user_by_name(username) {
        Ok(Some(user)) => {
            if user.password_hash != hash_password(password) {
                warn!(user = username, "Login failed: bad password");
                return result;
            }
            let token = generate_token();
            if let Err(e) = store.create_session(user.id, &token) {
                warn!(user = username, error = %e, "Failed to create session");
            }
            result.authenticated = true;
            result.username = user.username;
            result.user_id = user.id;
            result.zero_trust_required = user.zero_trust_enabled;
            result.session_token = Some(token);
        }
        Ok(None) => {
            warn!(user = username, "Login failed: user not found");
        }
        Err(e) => {
            warn!(error = %e, "User lookup failed");
        }
    }

    result
}

/// Validate login-form credentials and mint a session token
pub fn login(store: &Arc<Store>, username: &str, password: &str) -> Option<String> {
    match store.user_by_name(username) {
        Ok(Some(user)) => {
            if user.password_hash != hash_password(password) {
                warn!(user = username, "Login failed: bad password");
                return None;
            }
            let token = generate_token();
            match store.create_session(user.id, &token) {
                Ok(()) => Some(token),
                Err(e) => {
                    warn!(user = username, error = %e, "Failed to create session");
                    None
                }
            }
        }
        Ok(None) => {
            warn!(user = username, "Login failed: user not found");
            None
        }
        Err(e) => {
            warn!(error = %e, "User lookup failed");
            None
        }
    }
}

/// Login page HTML
pub const LOGIN_PAGE: &str = r#"<!doctype html><html lang="en"><head><meta charset="UTF-8"/><meta name="viewport" content="width=device-width, initial-scale=1.0"/><title>Zero-Trust Gateway</title><style>body{margin:0;font:16px/1.4 system-ui,sans-serif;display:grid;place-items:center;min-height:100vh;background:#09090b;color:#e4e4e7}.card{width:100%;max-width:400px;padding:32px;background:#18181b;border:1px solid #27272a;border-radius:12px}h1{margin:0 0 4px;font-size:22px;color:#fff}.sub{margin:0 0 24px;font-size:13px;color:#a1a1aa}label{display:block;margin:0 0 4px;font-size:11px;letter-spacing:.05em;text-transform:uppercase;color:#a1a1aa}input{width:100%;box-sizing:border-box;margin-bottom:16px;padding:10px 12px;font-size:15px;background:#09090b;color:#fff;border:1px solid #3f3f46;border-radius:8px}button{width:100%;padding:11px;font-size:15px;font-weight:600;color:#fff;background:#4f46e5;border:none;border-radius:8px;cursor:pointer}button:hover{background:#4338ca}.fine{margin-top:24px;padding-top:16px;border-top:1px solid #27272a;font-size:11px;color:#71717a;text-align:center}</style></head><body><div class="card"><h1>Access Verification</h1><p class="sub">Continuous authentication active</p><form method="POST" action="/login"><label>Corporate ID</label><input type="text" name="username" autocomplete="username" autofocus/><label>Access Token</label><input type="password" name="password" autocomplete="current-password"/><button type="submit">Authorize Session</button></form><p class="fine">By attempting access you agree to the Least Privilege Policy. All actions logged.</p></div></body></html>"#;

/// Random URL-safe session token
fn generate_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Extract one cookie value from the Cookie header
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        if let Some((key, value)) = pair.trim().split_once('=') {
            if key == name && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn store() -> Arc<Store> {
        Arc::new(Store::open_in_memory().unwrap())
    }

    fn basic_auth(username: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode(format!("{}:{}", username, password));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_unauthenticated_without_credentials() {
        let result = check(&store(), &HeaderMap::new());
        assert!(!result.authenticated);
    }

    #[test]
    fn test_basic_auth_with_seeded_admin() {
        let store = store();
        let result = check(&store, &basic_auth("admin", "admin"));
        assert!(result.authenticated);
        assert_eq!(result.username, "admin");
        assert!(result.session_token.is_some());
    }

    #[test]
    fn test_basic_auth_wrong_password() {
        let result = check(&store(), &basic_auth("admin", "wrong"));
        assert!(!result.authenticated);
    }

    #[test]
    fn test_basic_auth_unknown_user() {
        let result = check(&store(), &basic_auth("nobody", "pw"));
        assert!(!result.authenticated);
    }

    #[test]
    fn test_cookie_session_roundtrip() {
        let store = store();
        let token = login(&store, "admin", "admin").expect("login should succeed");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("other=1; {}={}", AUTH_COOKIE, token)).unwrap(),
        );
        let result = check(&store, &headers);
        assert!(result.authenticated);
        assert_eq!(result.username, "admin");
    }

    #[test]
    fn test_invalid_cookie_rejected() {
        let store = store();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}=bogus", AUTH_COOKIE)).unwrap(),
        );
        assert!(!check(&store, &headers).authenticated);
    }

    #[test]
    fn test_login_bad_credentials() {
        let store = store();
        assert!(login(&store, "admin", "wrong").is_none());
        assert!(login(&store, "ghost", "pw").is_none());
    }

    #[test]
    fn test_cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("a=1; auth_token=tok; b=2"),
        );
        assert_eq!(cookie_value(&headers, "auth_token").as_deref(), Some("tok"));
        assert!(cookie_value(&headers, "missing").is_none());
    }
}
