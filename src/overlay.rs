//! Debug analysis overlay
//!
//! When `debug_overlay` is enabled, HTML responses get a fixed-position
//! panel injected before `</body>` showing the per-request decision record.
//! Non-HTML bodies and bodies without a closing tag pass through untouched.

use std::time::Instant;

/// Per-request decision record, filled in by the pipeline as stages run
#[derive(Debug, Clone)]
pub struct AnalysisInfo {
    pub request_id: String,
    pub started_at: Instant,
    pub client_ip: String,
    pub host: String,
    pub path: String,
    pub method: String,
    pub request_allowed: bool,
    pub block_reason: String,
    pub waf_checked: bool,
    pub waf_blocked: bool,
    pub waf_rule_name: String,
    pub ai_enabled: bool,
    pub ai_checked: bool,
    pub ai_blocked: bool,
    pub ai_label: String,
    pub ai_score: f64,
    pub ai_threshold: f64,
    pub ai_processing_ms: u128,
    pub ai_error: String,
    pub cache_hit: bool,
    pub target_url: String,
}

impl AnalysisInfo {
    pub fn new(client_ip: &str, host: &str, path: &str, method: &str, ai_threshold: f64) -> Self {
        let started_at = Instant::now();
        Self {
            request_id: format!("{:016x}", rand_id()),
            started_at,
            client_ip: client_ip.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            method: method.to_string(),
            request_allowed: true,
            block_reason: String::new(),
            waf_checked: false,
            waf_blocked: false,
            waf_rule_name: String::new(),
            ai_enabled: false,
            ai_checked: false,
            ai_blocked: false,
            ai_label: String::new(),
            ai_score: 0.0,
            ai_threshold,
            ai_processing_ms: 0,
            ai_error: String::new(),
            cache_hit: false,
            target_url: String::new(),
        }
    }
}

fn rand_id() -> u64 {
    use rand::RngCore;
    rand::thread_rng().next_u64()
}

/// Inject the overlay panel before the closing `</body>` tag.
/// Returns `None` when the body has no closing tag.
pub fn inject_overlay(body: &[u8], info: &AnalysisInfo) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(body).ok()?;
    let pos = text.to_ascii_lowercase().find("</body>")?;

    let panel = render_panel(info);
    let mut result = Vec::with_capacity(body.len() + panel.len());
    result.extend_from_slice(&body[..pos]);
    result.extend_from_slice(panel.as_bytes());
    result.extend_from_slice(&body[pos..]);
    Some(result)
}

fn render_panel(info: &AnalysisInfo) -> String {
    let mut rows = String::new();
    rows.push_str(&format!(
        "<div>request <code>{} {}</code> from {}</div>",
        info.method, info.path, info.client_ip
    ));
    rows.push_str(&format!(
        "<div>verdict: <b style=\"color:{}\">{}</b>{}</div>",
        if info.request_allowed { "#4ade80" } else { "#f87171" },
        if info.request_allowed { "allowed" } else { "blocked" },
        if info.block_reason.is_empty() {
            String::new()
        } else {
            format!(" — {}", info.block_reason)
        }
    ));
    if info.waf_checked {
        rows.push_str(&format!(
            "<div>waf: {}</div>",
            if info.waf_blocked {
                format!("blocked by {}", info.waf_rule_name)
            } else {
                "pass".to_string()
            }
        ));
    }
    if info.ai_checked {
        rows.push_str(&format!(
            "<div>ai: {} score {:.2} (threshold {:.2}) in {} ms{}</div>",
            info.ai_label,
            info.ai_score,
            info.ai_threshold,
            info.ai_processing_ms,
            if info.ai_error.is_empty() {
                String::new()
            } else {
                format!(" error: {}", info.ai_error)
            }
        ));
    }
    if !info.target_url.is_empty() {
        rows.push_str(&format!(
            "<div>target: {} (cache {})</div>",
            info.target_url,
            if info.cache_hit { "HIT" } else { "MISS" }
        ));
    }
    rows.push_str(&format!(
        "<div>elapsed: {} ms | id {}</div>",
        info.started_at.elapsed().as_millis(),
        info.request_id
    ));

    format!(
        "<div id=\"netgoat-overlay\" style=\"position:fixed;bottom:12px;right:12px;z-index:2147483647;\
         max-width:360px;padding:10px 14px;font:12px/1.5 monospace;color:#e4e4e7;background:rgba(9,9,11,0.92);\
         border:1px solid #3f3f46;border-radius:8px;\">{}</div>",
        rows
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> AnalysisInfo {
        let mut info = AnalysisInfo::new("192.0.2.1", "example.com", "/x", "GET", 0.7);
        info.waf_checked = true;
        info.target_url = "http://upstream:80".to_string();
        info
    }

    #[test]
    fn test_inject_before_body_close() {
        let body = b"<html><body><p>Hello</p></body></html>";
        let result = inject_overlay(body, &info()).unwrap();
        let text = String::from_utf8(result).unwrap();
        let overlay_pos = text.find("netgoat-overlay").unwrap();
        let close_pos = text.find("</body>").unwrap();
        assert!(overlay_pos < close_pos);
        assert!(text.contains("<p>Hello</p>"));
    }

    #[test]
    fn test_case_insensitive_body_tag() {
        let body = b"<html><body>x</BODY></html>";
        assert!(inject_overlay(body, &info()).is_some());
    }

    #[test]
    fn test_no_body_tag_passthrough() {
        assert!(inject_overlay(b"<html>no closing tag", &info()).is_none());
        assert!(inject_overlay(&[0xff, 0xfe, 0x00], &info()).is_none());
    }

    #[test]
    fn test_panel_reflects_block() {
        let mut i = info();
        i.request_allowed = false;
        i.waf_blocked = true;
        i.waf_rule_name = "Block Admin".to_string();
        i.block_reason = "WAF rule triggered: Block Admin".to_string();
        let result = inject_overlay(b"<body></body>", &i).unwrap();
        let text = String::from_utf8(result).unwrap();
        assert!(text.contains("blocked"));
        assert!(text.contains("Block Admin"));
    }
}
