//! Gateway configuration with YAML parsing
//!
//! All tunables are externalized to `config.yml`. Every section carries
//! serde defaults so a missing or partial file still yields a runnable
//! gateway. Environment variables override the API stream settings so
//! deployments can keep credentials out of the config file.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Log WAF rule evaluation at debug level
    pub debug_logs: bool,
    /// Inject the analysis overlay into HTML responses
    pub debug_overlay: bool,
    /// Enable the honeypot trap for reconnaissance paths
    pub honeypot: bool,
    /// Authentication gate
    pub auth: AuthConfig,
    /// TLS listener settings
    pub ssl: SslConfig,
    /// Path to a static HTML file served for errors to verified clients
    pub custom_error_page: String,
    /// Anomaly classifier settings
    pub anomaly: AnomalyConfig,
    /// Per-domain and per-path error pages (values are file paths)
    pub error_pages: ErrorPagesConfig,
    /// Response cache settings
    pub cache: CacheConfig,
    /// External configuration API
    pub api: ApiConfig,
}

/// Authentication gate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require a session before the request enters the pipeline
    pub enabled: bool,
    /// Secret used to derive session material
    pub session_secret: String,
}

/// TLS listener configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    /// Serve TLS instead of plain HTTP
    pub enabled: bool,
    /// Path to the certificate chain (PEM)
    pub cert_file: String,
    /// Path to the private key (PEM)
    pub key_file: String,
    /// Listen address, e.g. ":8443"
    pub port: String,
}

/// Anomaly classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Enable the classifier subprocess
    pub enabled: bool,
    /// Block threshold on the classifier score (0 uses the default)
    pub threshold: f64,
    /// Path to the model file
    pub model_path: String,
    /// Path to the feature scaler
    pub scaler_path: String,
    /// Python entry point that serves predictions over stdin/stdout
    pub python_script: String,
    /// Header carrying the CSV feature vector
    pub feature_header: String,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.0,
            model_path: String::new(),
            scaler_path: String::new(),
            python_script: String::new(),
            feature_header: String::new(),
        }
    }
}

impl AnomalyConfig {
    /// Block threshold with the default applied
    pub fn effective_threshold(&self) -> f64 {
        if self.threshold == 0.0 {
            0.7
        } else {
            self.threshold
        }
    }

    /// Feature header name with the default applied
    pub fn effective_feature_header(&self) -> &str {
        if self.feature_header.is_empty() {
            "X-GoatAI-Features"
        } else {
            &self.feature_header
        }
    }

    /// Model path with the default applied
    pub fn effective_model_path(&self) -> &str {
        if self.model_path.is_empty() {
            "ai/goatai.keras"
        } else {
            &self.model_path
        }
    }

    /// Scaler path with the default applied
    pub fn effective_scaler_path(&self) -> &str {
        if self.scaler_path.is_empty() {
            "ai/scaler.pkl"
        } else {
            &self.scaler_path
        }
    }

    /// Python script path with the default applied
    pub fn effective_python_script(&self) -> &str {
        if self.python_script.is_empty() {
            "ai/model_server.py"
        } else {
            &self.python_script
        }
    }
}

/// Error page mapping configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPagesConfig {
    /// Host -> error page file path
    pub domain: HashMap<String, String>,
    /// Path prefix -> error page file path
    pub path: HashMap<String, String>,
}

/// Response cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the response cache
    pub enabled: bool,
    /// Entry time-to-live in seconds (<= 0 uses 60)
    pub ttl_seconds: i64,
    /// Maximum number of entries (<= 0 uses 1024)
    pub max_entries: i64,
    /// Maximum cacheable body size in bytes (<= 0 uses 1 MiB)
    pub max_body_bytes: i64,
}

impl CacheConfig {
    /// TTL with the default applied
    pub fn effective_ttl_seconds(&self) -> u64 {
        if self.ttl_seconds <= 0 {
            60
        } else {
            self.ttl_seconds as u64
        }
    }

    /// Entry bound with the default applied
    pub fn effective_max_entries(&self) -> usize {
        if self.max_entries <= 0 {
            1024
        } else {
            self.max_entries as usize
        }
    }

    /// Body bound with the default applied
    pub fn effective_max_body_bytes(&self) -> usize {
        if self.max_body_bytes <= 0 {
            1 << 20
        } else {
            self.max_body_bytes as usize
        }
    }
}

/// External configuration API settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the configuration API
    pub url: String,
    /// API key sent as `X-API-Key` and bearer token
    pub key: String,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {:?}: {}", path, e))?;

        let config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// API stream URL, with `API_STREAM_URL` taking precedence over the file
    pub fn api_stream_url(&self) -> Option<String> {
        if let Ok(url) = std::env::var("API_STREAM_URL") {
            if !url.is_empty() {
                return Some(url);
            }
        }
        if !self.api.url.is_empty() {
            return Some(self.api.url.clone());
        }
        None
    }

    /// API key, with `API_STREAM_KEY` then `API_KEY` taking precedence
    pub fn api_stream_key(&self) -> Option<String> {
        for var in ["API_STREAM_KEY", "API_KEY"] {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    return Some(key);
                }
            }
        }
        if !self.api.key.is_empty() {
            return Some(self.api.key.clone());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(!config.honeypot);
        assert!(!config.auth.enabled);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.effective_ttl_seconds(), 60);
        assert_eq!(config.cache.effective_max_entries(), 1024);
        assert_eq!(config.cache.effective_max_body_bytes(), 1 << 20);
        assert!((config.anomaly.effective_threshold() - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.anomaly.effective_feature_header(), "X-GoatAI-Features");
    }

    #[test]
    fn test_config_parsing() {
        let yaml = r#"
debug_logs: true
honeypot: true
auth:
  enabled: true
  session_secret: "s3cret"
ssl:
  enabled: true
  cert_file: /etc/netgoat/cert.pem
  key_file: /etc/netgoat/key.pem
  port: ":8443"
custom_error_page: pages/error.html
anomaly:
  enabled: true
  threshold: 0.85
  feature_header: X-Features
cache:
  enabled: true
  ttl_seconds: 120
  max_entries: 64
error_pages:
  domain:
    example.com: pages/example.html
  path:
    /api: pages/api.html
api:
  url: https://api.example.com
  key: abc123
"#;

        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.debug_logs);
        assert!(config.honeypot);
        assert!(config.auth.enabled);
        assert_eq!(config.ssl.port, ":8443");
        assert_eq!(config.custom_error_page, "pages/error.html");
        assert!((config.anomaly.threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.anomaly.effective_feature_header(), "X-Features");
        assert_eq!(config.cache.effective_ttl_seconds(), 120);
        assert_eq!(config.cache.effective_max_entries(), 64);
        // Unset values fall back to defaults
        assert_eq!(config.cache.effective_max_body_bytes(), 1 << 20);
        assert_eq!(config.error_pages.domain.len(), 1);
        assert_eq!(config.error_pages.path.len(), 1);
        assert_eq!(config.api.url, "https://api.example.com");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = "honeypot: true\n";
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.honeypot);
        assert!(!config.auth.enabled);
        assert!(config.custom_error_page.is_empty());
    }

    #[test]
    fn test_api_key_from_file() {
        let config: GatewayConfig = serde_yaml::from_str("api:\n  key: filekey\n").unwrap();
        // Env vars are unset in the test environment for these names
        if std::env::var("API_STREAM_KEY").is_err() && std::env::var("API_KEY").is_err() {
            assert_eq!(config.api_stream_key().as_deref(), Some("filekey"));
        }
    }
}
