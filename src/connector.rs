//! Connection loop to the external configuration API
//!
//! Maintains one logical polling session against `{base}/snapshot` with
//! exponential backoff (base 5 s, cap 2 min, reset on success). A snapshot
//! with a higher version than the last applied one is wrapped into a stream
//! message and handed to the manager. Auth failures surface as
//! "unauthorized" on the manager's connection status and keep backing off.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::streaming::{Manager, Message, RouteData, UserData, UserDomainData, WafRuleData};

/// Initial retry interval
const BASE_INTERVAL: Duration = Duration::from_secs(5);

/// Backoff ceiling
const MAX_INTERVAL: Duration = Duration::from_secs(120);

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot payload returned by `GET {base}/snapshot`
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotPayload {
    version: i64,
    #[serde(default)]
    routes: HashMap<String, RouteData>,
    #[serde(default)]
    waf_rules: HashMap<String, WafRuleData>,
    #[serde(default)]
    users: Vec<UserData>,
    #[serde(default)]
    user_domains: Vec<UserDomainData>,
    #[serde(default)]
    zero_trust_enabled: bool,
}

/// Run the polling loop forever. Spawned as a background task; cancelled by
/// dropping the task on shutdown.
pub async fn run(manager: Arc<Manager>, api_url: String, api_key: String) {
    let snapshot_url = format!("{}/snapshot", api_url.trim_end_matches('/'));
    info!(url = %snapshot_url, "Starting config stream connection to external API");

    let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to build API client; config streaming disabled");
            return;
        }
    };

    let mut interval = BASE_INTERVAL;
    let mut last_version: i64 = -1;
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::time::sleep(interval).await;

        match poll_once(&client, &snapshot_url, &api_key, &manager, &mut last_version).await {
            Ok(()) => {
                if consecutive_failures > 0 {
                    info!(
                        previous_failures = consecutive_failures,
                        "Connection recovered"
                    );
                }
                consecutive_failures = 0;
                interval = BASE_INTERVAL;
                manager.set_connection_status(true, None);
            }
            Err(e) => {
                consecutive_failures += 1;
                manager.set_connection_status(false, Some(e.clone()));
                if consecutive_failures == 1 || consecutive_failures % 10 == 0 {
                    warn!(
                        error = %e,
                        failures = consecutive_failures,
                        retry_in = ?interval,
                        "Snapshot poll failed, will retry"
                    );
                } else {
                    debug!(error = %e, failures = consecutive_failures, "Snapshot poll failed");
                }
                interval = (interval * 2).min(MAX_INTERVAL);
            }
        }
    }
}

async fn poll_once(
    client: &reqwest::Client,
    snapshot_url: &str,
    api_key: &str,
    manager: &Manager,
    last_version: &mut i64,
) -> Result<(), String> {
    debug!(url = %snapshot_url, "Polling snapshot");

    let mut request = client.get(snapshot_url);
    if !api_key.is_empty() {
        request = request
            .header("X-API-Key", api_key)
            .header("Authorization", format!("Bearer {}", api_key));
    }

    let response = request.send().await.map_err(|e| e.to_string())?;
    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err("unauthorized: check API key".to_string());
    }
    if !status.is_success() {
        return Err(format!("unexpected status: {}", status.as_u16()));
    }

    let payload: SnapshotPayload = response.json().await.map_err(|e| e.to_string())?;

    if payload.version <= *last_version {
        debug!(version = payload.version, "Config version unchanged");
        return Ok(());
    }

    info!(
        new_version = payload.version,
        last_version = *last_version,
        routes = payload.routes.len(),
        "New config version detected"
    );
    *last_version = payload.version;

    let message = Message {
        msg_type: "snapshot".to_string(),
        data: serde_json::to_value(&payload).map_err(|e| e.to_string())?,
        version: payload.version,
        timestamp: Utc::now(),
    };

    manager
        .handle_message(&message)
        .map_err(|e| e.to_string())?;
    info!(
        version = payload.version,
        routes = payload.routes.len(),
        "Applied new config from API"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_decoding() {
        let body = r#"{
            "version": 7,
            "routes": {
                "svc.test": {"type": "domain", "target": "http://svc:80"},
                "/api": {"type": "path", "target": "http://api:3000"}
            },
            "waf_rules": {
                "X": {"name": "X", "expression": "Path startsWith \"/admin\"", "action": "BLOCK", "priority": 10}
            },
            "zero_trust_enabled": true
        }"#;

        let payload: SnapshotPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.version, 7);
        assert_eq!(payload.routes.len(), 2);
        assert_eq!(payload.routes["svc.test"].route_type, "domain");
        assert_eq!(payload.waf_rules["X"].priority, 10);
        assert!(payload.zero_trust_enabled);
        assert!(payload.users.is_empty());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut interval = BASE_INTERVAL;
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(interval);
            interval = (interval * 2).min(MAX_INTERVAL);
        }
        assert_eq!(seen[0], Duration::from_secs(5));
        assert_eq!(seen[1], Duration::from_secs(10));
        assert_eq!(seen[4], Duration::from_secs(80));
        assert_eq!(seen[5], MAX_INTERVAL);
        assert_eq!(seen[7], MAX_INTERVAL);
    }
}
