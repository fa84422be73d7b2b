//! NetGoat Proxy - reverse-proxying security gateway
//!
//! A gateway that sits in front of upstream HTTP services and, for every
//! request:
//! - Serves honeypot bait for attacker-reconnaissance paths
//! - Evaluates WAF rules (compiled expressions, priority ordered)
//! - Optionally scores the request with an external anomaly classifier
//! - Issues reputation challenges to suspicious clients on the error path
//! - Resolves a route (domain first, then longest path prefix) and proxies
//! - Caches safe-method responses in a bounded LRU with TTL
//! - Ingests versioned configuration snapshots from an external API stream

pub mod anomaly;
pub mod auth;
pub mod cache;
pub mod challenge;
pub mod config;
pub mod connector;
pub mod database;
pub mod envelope;
pub mod error;
pub mod error_pages;
pub mod expr;
pub mod gateway;
pub mod honeypot;
pub mod overlay;
pub mod proxy;
pub mod render;
pub mod streaming;
pub mod waf;

// Re-export commonly used types
pub use cache::ResponseCache;
pub use challenge::{ChallengeKind, ChallengeStore};
pub use config::GatewayConfig;
pub use database::Store;
pub use envelope::RequestEnvelope;
pub use error::GatewayError;
pub use gateway::{build_router, GatewayState};
pub use streaming::{ConfigSnapshot, Manager, Message};
pub use waf::{Decision, WafEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
