//! Static error page store
//!
//! Error pages for verified clients, loaded once from the configured file
//! paths. Selection order: host-specific page, then the longest matching
//! path-prefix page, then the default page.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::config::GatewayConfig;

/// Loaded error pages keyed by host and path prefix
#[derive(Debug, Default)]
pub struct ErrorPageStore {
    default: Option<Vec<u8>>,
    by_host: HashMap<String, Vec<u8>>,
    by_path: HashMap<String, Vec<u8>>,
}

impl ErrorPageStore {
    /// Load the pages named in the configuration, logging failures
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut store = Self::default();

        if !config.custom_error_page.is_empty() {
            match std::fs::read(&config.custom_error_page) {
                Ok(bytes) => {
                    info!(
                        path = %config.custom_error_page,
                        bytes = bytes.len(),
                        "Loaded default error page"
                    );
                    store.default = Some(bytes);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %config.custom_error_page, error = %e, "Failed to read default error page");
                }
            }
        }

        for (host, path) in &config.error_pages.domain {
            if path.is_empty() {
                continue;
            }
            match std::fs::read(path) {
                Ok(bytes) => {
                    info!(host = %host, path = %path, "Loaded host error page");
                    store.by_host.insert(host.to_ascii_lowercase(), bytes);
                }
                Err(e) => {
                    warn!(host = %host, path = %path, error = %e, "Failed to read host error page");
                }
            }
        }

        for (prefix, path) in &config.error_pages.path {
            if path.is_empty() {
                continue;
            }
            match std::fs::read(path) {
                Ok(bytes) => {
                    info!(prefix = %prefix, path = %path, "Loaded path error page");
                    store.by_path.insert(prefix.clone(), bytes);
                }
                Err(e) => {
                    warn!(prefix = %prefix, path = %path, error = %e, "Failed to read path error page");
                }
            }
        }

        store
    }

    /// Pick the page for a request: host page, longest path prefix, default
    pub fn pick(&self, host: &str, path: &str) -> Option<&[u8]> {
        if let Some(page) = self.by_host.get(&host.to_ascii_lowercase()) {
            if !page.is_empty() {
                return Some(page);
            }
        }

        let mut best_len = 0usize;
        let mut chosen: Option<&[u8]> = None;
        for (prefix, page) in &self.by_path {
            if path.starts_with(prefix.as_str()) && prefix.len() >= best_len && !page.is_empty() {
                // Strictly longer prefixes win; equal-length is arbitrary but
                // stable within one map iteration.
                if prefix.len() > best_len || chosen.is_none() {
                    best_len = prefix.len();
                    chosen = Some(page);
                }
            }
        }
        if chosen.is_some() {
            return chosen;
        }

        self.default.as_deref().filter(|p| !p.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn with_pages(
        default: Option<Vec<u8>>,
        by_host: HashMap<String, Vec<u8>>,
        by_path: HashMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            default,
            by_host,
            by_path,
        }
    }
}

/// Heuristic check that a loaded page is actually HTML
pub fn is_html(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_start().to_ascii_lowercase();
    trimmed.starts_with('<') && (trimmed.contains("<html") || trimmed.contains("<body"))
}
