//! Configuration streaming manager
//!
//! Owns the authoritative versioned snapshot. Messages from the external
//! source are applied idempotently (stale versions skipped), persisted
//! atomically to a recovery file, and fanned out to subscribers over bounded
//! channels with non-blocking sends. Slow subscribers drop updates; the
//! contract is *eventually latest*, not every intermediate version.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Fan-out channel capacity per subscriber
const SUBSCRIBER_CAPACITY: usize = 10;

/// A route entry in the snapshot. For `type == "domain"` the snapshot key is
/// the hostname; for `type == "path"` it is the path prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteData {
    #[serde(rename = "type")]
    pub route_type: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_pem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_pem: Option<String>,
}

/// A WAF rule carried by the snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WafRuleData {
    pub name: String,
    pub expression: String,
    pub action: String,
    pub priority: i64,
}

/// A user carried by the snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    #[serde(default)]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub zero_trust_enabled: bool,
}

/// A user-owned domain carried by the snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDomainData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    pub domain: String,
    pub target_url: String,
    #[serde(default)]
    pub active: bool,
}

/// A complete, versioned configuration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    pub version: i64,
    pub timestamp: DateTime<Utc>,
    pub routes: HashMap<String, RouteData>,
    pub waf_rules: HashMap<String, WafRuleData>,
    pub users: Vec<UserData>,
    pub user_domains: Vec<UserDomainData>,
    pub zero_trust_enabled: bool,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            version: 0,
            timestamp: Utc::now(),
            routes: HashMap::new(),
            waf_rules: HashMap::new(),
            users: Vec::new(),
            user_domains: Vec::new(),
            zero_trust_enabled: false,
        }
    }
}

/// A message from the streaming source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Opaque JSON payload of a [`ConfigSnapshot`]
    pub data: serde_json::Value,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
}

/// Errors from message ingestion
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

struct ManagerState {
    current: ConfigSnapshot,
    version: i64,
    subscribers: Vec<mpsc::Sender<ConfigSnapshot>>,
    connected: bool,
    last_error: Option<String>,
}

/// Owner of the authoritative snapshot with durable recovery and fan-out
pub struct Manager {
    state: Mutex<ManagerState>,
    recovery_path: PathBuf,
}

impl Manager {
    /// Create a manager, recovering the last persisted snapshot if present
    pub fn new(recovery_path: impl AsRef<Path>) -> Self {
        let recovery_path = recovery_path.as_ref().to_path_buf();
        let manager = Self {
            state: Mutex::new(ManagerState {
                current: ConfigSnapshot::default(),
                version: 0,
                subscribers: Vec::new(),
                connected: false,
                last_error: None,
            }),
            recovery_path,
        };

        match manager.load_from_disk() {
            Ok(snapshot) => {
                info!(
                    file = %manager.recovery_path.display(),
                    version = snapshot.version,
                    "Loaded snapshot from disk"
                );
                let mut state = manager.state.lock();
                state.version = snapshot.version;
                state.current = snapshot;
            }
            Err(e) => {
                warn!(
                    file = %manager.recovery_path.display(),
                    error = %e,
                    "Could not load snapshot from disk, using defaults"
                );
            }
        }

        manager
    }

    /// Register a subscriber. The current snapshot is delivered as the first
    /// element, then every accepted ingestion (subject to backpressure drop).
    pub fn subscribe(&self) -> mpsc::Receiver<ConfigSnapshot> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut state = self.state.lock();
        // Capacity is fresh, this send cannot fail
        let _ = tx.try_send(state.current.clone());
        state.subscribers.push(tx);
        rx
    }

    /// Ingest a stream message. Stale versions are skipped silently;
    /// decode failures leave the current state untouched.
    pub fn handle_message(&self, msg: &Message) -> Result<(), StreamError> {
        let mut state = self.state.lock();

        if msg.version <= state.version {
            debug!(
                msg_version = msg.version,
                current_version = state.version,
                "Ignoring stale message version"
            );
            return Ok(());
        }

        if msg.msg_type != "snapshot" {
            return Err(StreamError::UnknownType(msg.msg_type.clone()));
        }

        let mut snapshot: ConfigSnapshot = serde_json::from_value(msg.data.clone())?;
        snapshot.version = msg.version;
        snapshot.timestamp = msg.timestamp;

        state.current = snapshot;
        state.version = msg.version;
        state.connected = true;
        state.last_error = None;

        info!(
            version = msg.version,
            routes = state.current.routes.len(),
            waf_rules = state.current.waf_rules.len(),
            users = state.current.users.len(),
            "Config snapshot updated"
        );

        // Persist for fault tolerance; the in-memory update stands even if
        // the write fails.
        if let Err(e) = self.save_to_disk(&state.current) {
            error!(error = %e, "Failed to persist snapshot to disk");
        }

        // Non-blocking fan-out; a full subscriber misses this version
        let snapshot = state.current.clone();
        state
            .subscribers
            .retain(|tx| match tx.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Subscriber channel full; dropping snapshot update");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });

        Ok(())
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> ConfigSnapshot {
        self.state.lock().current.clone()
    }

    /// Version of the current snapshot
    pub fn version(&self) -> i64 {
        self.state.lock().version
    }

    /// Record the connector's connection state
    pub fn set_connection_status(&self, connected: bool, error: Option<String>) {
        let mut state = self.state.lock();
        state.connected = connected;
        state.last_error = error;
    }

    /// Connector connection state and last error
    pub fn connection_status(&self) -> (bool, Option<String>) {
        let state = self.state.lock();
        (state.connected, state.last_error.clone())
    }

    /// Drop all subscribers, closing their channels
    pub fn close(&self) {
        self.state.lock().subscribers.clear();
    }

    fn save_to_disk(&self, snapshot: &ConfigSnapshot) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(snapshot)?;

        // Write to a temp file then rename for atomicity
        let tmp_path = self.recovery_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &data)?;
        if let Err(e) = std::fs::rename(&tmp_path, &self.recovery_path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(
            file = %self.recovery_path.display(),
            version = snapshot.version,
            "Saved snapshot to disk"
        );
        Ok(())
    }

    fn load_from_disk(&self) -> anyhow::Result<ConfigSnapshot> {
        let data = std::fs::read(&self.recovery_path)?;
        let snapshot: ConfigSnapshot = serde_json::from_slice(&data)?;
        Ok(snapshot)
    }
}
