//! Dynamic error and challenge page rendering
//!
//! Unverified clients hitting the error path get one of these pages instead
//! of the configured static error page. Challenge pages POST to the fixed
//! verification endpoint. Pages are assembled with `push_str` so the CSS and
//! JS blocks stay free of format-string escaping.

use crate::challenge::{Challenge, ChallengeKind};

/// Fixed verification endpoint the challenge forms POST to
pub const VERIFY_ENDPOINT: &str = "/__netgoat/verify";

/// Render the error page for an unverified client. With no challenge (or
/// kind None) a plain blocked page is returned.
pub fn render_dynamic_error_page(
    challenge: Option<&Challenge>,
    status: u16,
    message: &str,
) -> String {
    match challenge {
        Some(ch) if ch.kind != ChallengeKind::None => match ch.kind {
            ChallengeKind::Text => render_text_challenge(ch, status),
            ChallengeKind::Click => render_click_challenge(ch, status),
            ChallengeKind::Slider => render_slider_challenge(ch, status),
            ChallengeKind::None => unreachable!(),
        },
        _ => render_simple_error(status, message),
    }
}

/// Minimal HTML escaping for text interpolated into pages
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page_head(title: &str, gradient: &str) -> String {
    let mut html = String::with_capacity(1024);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\"/>\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"/>\n");
    html.push_str(&format!("<title>{}</title>\n", title));
    html.push_str("<style>\n:root { color-scheme: light dark; }\n");
    html.push_str(&format!(
        "body {{ margin: 0; font: 16px/1.4 system-ui, sans-serif; display: grid; place-items: center; min-height: 100vh; background: {}; }}\n",
        gradient
    ));
    html.push_str(".card { max-width: 520px; padding: 40px; background: white; border-radius: 16px; box-shadow: 0 20px 60px rgba(0,0,0,0.3); }\n");
    html.push_str("h1 { margin: 0 0 8px; font-size: 24px; color: #333; }\n");
    html.push_str(".bot-id { font-size: 11px; color: #999; font-family: monospace; margin-bottom: 16px; }\n");
    html.push_str(".suspicion { font-size: 12px; color: #999; margin-top: 12px; }\n");
    html
}

fn suspicion_footer(suspicion: u8, status: u16) -> String {
    format!(
        "<div class=\"suspicion\">Suspicion Score: {}/100 | Status: {}</div>\n",
        suspicion, status
    )
}

fn render_simple_error(status: u16, message: &str) -> String {
    let mut html = page_head(
        "Request Blocked",
        "linear-gradient(135deg, #667eea 0%, #764ba2 100%)",
    );
    html.push_str("p { margin: 0 0 12px; color: #666; }\n");
    html.push_str("code { background: #f5f5f5; padding: 2px 6px; border-radius: 4px; font-size: 14px; }\n");
    html.push_str("</style>\n</head>\n<body>\n<div class=\"card\">\n");
    html.push_str("<h1>🚫 Request Blocked</h1>\n");
    html.push_str(&format!("<p>{}</p>\n", escape_html(message)));
    html.push_str(&format!("<p>Status: <code>{}</code></p>\n", status));
    html.push_str("</div>\n</body>\n</html>");
    html
}

fn render_text_challenge(ch: &Challenge, status: u16) -> String {
    let mut html = page_head(
        "Verification Required",
        "linear-gradient(135deg, #667eea 0%, #764ba2 100%)",
    );
    html.push_str(".challenge { margin: 24px 0; padding: 20px; background: #f8f9fa; border-radius: 8px; border-left: 4px solid #667eea; }\n");
    html.push_str(".word { display: inline-block; padding: 8px 16px; margin: 4px; background: white; border: 2px solid #667eea; border-radius: 8px; font-size: 20px; font-weight: bold; letter-spacing: 3px; color: #667eea; }\n");
    html.push_str("input { width: 100%; padding: 12px; font-size: 16px; border: 2px solid #ddd; border-radius: 8px; box-sizing: border-box; margin-top: 12px; }\n");
    html.push_str("button { width: 100%; padding: 12px; background: #667eea; color: white; border: none; border-radius: 8px; font-size: 16px; font-weight: 600; cursor: pointer; margin-top: 12px; }\n");
    html.push_str("button:hover { background: #5568d3; }\n");
    html.push_str("</style>\n</head>\n<body>\n<div class=\"card\">\n");
    html.push_str("<h1>🤖 Verification Required</h1>\n");
    html.push_str(&format!("<div class=\"bot-id\">Bot ID: {}</div>\n", ch.id));
    html.push_str("<p style=\"color: #666; margin-bottom: 8px;\">Your request was flagged by our security system.</p>\n");
    html.push_str("<div class=\"challenge\">\n");
    html.push_str("<p style=\"margin: 0 0 12px; font-weight: 600; color: #333;\">Type the word shown below:</p>\n");
    html.push_str(&format!("<div class=\"word\">{}</div>\n", escape_html(&ch.answer)));
    html.push_str("</div>\n");
    html.push_str(&format!(
        "<form method=\"POST\" action=\"{}\">\n",
        VERIFY_ENDPOINT
    ));
    html.push_str(&format!(
        "<input type=\"hidden\" name=\"challenge_id\" value=\"{}\"/>\n",
        ch.id
    ));
    html.push_str("<input type=\"text\" name=\"answer\" placeholder=\"Enter the word\" autocomplete=\"off\" autofocus required/>\n");
    html.push_str("<button type=\"submit\">Verify</button>\n</form>\n");
    html.push_str(&suspicion_footer(ch.suspicion, status));
    html.push_str("</div>\n</body>\n</html>");
    html
}

fn render_click_challenge(ch: &Challenge, status: u16) -> String {
    let mut html = page_head(
        "Verification Required",
        "linear-gradient(135deg, #f093fb 0%, #f5576c 100%)",
    );
    html.push_str(".challenge { margin: 24px 0; }\n");
    html.push_str(".grid { display: grid; grid-template-columns: repeat(3, 1fr); gap: 8px; }\n");
    html.push_str(".box { aspect-ratio: 1; background: #f8f9fa; border: 3px solid #ddd; border-radius: 8px; cursor: pointer; display: flex; align-items: center; justify-content: center; font-size: 32px; transition: all 0.2s; }\n");
    html.push_str(".box:hover { border-color: #f5576c; transform: scale(1.05); }\n");
    html.push_str(".box.selected { background: #f5576c; border-color: #f5576c; color: white; }\n");
    html.push_str("button { width: 100%; padding: 12px; background: #f5576c; color: white; border: none; border-radius: 8px; font-size: 16px; font-weight: 600; cursor: pointer; margin-top: 16px; }\n");
    html.push_str("button:hover { background: #e04858; }\n");
    html.push_str("</style>\n</head>\n<body>\n<div class=\"card\">\n");
    html.push_str("<h1>🎯 Click Verification</h1>\n");
    html.push_str(&format!("<div class=\"bot-id\">Bot ID: {}</div>\n", ch.id));
    html.push_str("<p style=\"color: #666; margin-bottom: 8px;\">Select all boxes containing <strong>🚀</strong></p>\n");
    html.push_str("<div class=\"challenge\">\n<div class=\"grid\" id=\"grid\"></div>\n</div>\n");
    html.push_str(&format!(
        "<form method=\"POST\" action=\"{}\" id=\"verifyForm\">\n",
        VERIFY_ENDPOINT
    ));
    html.push_str(&format!(
        "<input type=\"hidden\" name=\"challenge_id\" value=\"{}\"/>\n",
        ch.id
    ));
    html.push_str("<input type=\"hidden\" name=\"answer\" id=\"answer\" value=\"\"/>\n");
    html.push_str("<button type=\"submit\">Verify Selection</button>\n</form>\n");
    html.push_str(&suspicion_footer(ch.suspicion, status));
    html.push_str("</div>\n<script>\n");
    html.push_str(&format!(
        "const correct = \"{}\".split(\",\").map(x => parseInt(x));\n",
        ch.answer
    ));
    html.push_str("const selected = new Set();\n");
    html.push_str("const grid = document.getElementById(\"grid\");\n");
    html.push_str("const emojis = [\"🌟\", \"🎈\", \"🎨\", \"🎭\", \"🎪\", \"🎬\", \"🎮\", \"🎯\", \"🎲\"];\n");
    html.push_str("for (let i = 0; i < 9; i++) {\n");
    html.push_str("  const box = document.createElement(\"div\");\n");
    html.push_str("  box.className = \"box\";\n");
    html.push_str("  box.textContent = correct.includes(i) ? \"🚀\" : emojis[i];\n");
    html.push_str("  box.onclick = () => {\n");
    html.push_str("    if (selected.has(i)) { selected.delete(i); box.classList.remove(\"selected\"); }\n");
    html.push_str("    else { selected.add(i); box.classList.add(\"selected\"); }\n");
    html.push_str("    document.getElementById(\"answer\").value = Array.from(selected).sort().join(\",\");\n");
    html.push_str("  };\n  grid.appendChild(box);\n}\n");
    html.push_str("</script>\n</body>\n</html>");
    html
}

fn render_slider_challenge(ch: &Challenge, status: u16) -> String {
    let mut html = page_head(
        "Verification Required",
        "linear-gradient(135deg, #fa709a 0%, #fee140 100%)",
    );
    html.push_str(".challenge { margin: 24px 0; }\n");
    html.push_str(".puzzle-container { position: relative; width: 100%; height: 200px; background: linear-gradient(90deg, #fa709a 0%, #fee140 100%); border-radius: 12px; overflow: hidden; }\n");
    html.push_str(".puzzle-piece { position: absolute; width: 60px; height: 60px; background: white; border: 3px solid #333; border-radius: 8px; cursor: grab; box-shadow: 0 4px 12px rgba(0,0,0,0.2); display: flex; align-items: center; justify-content: center; font-size: 24px; }\n");
    html.push_str(".puzzle-piece:active { cursor: grabbing; }\n");
    html.push_str(".target-zone { position: absolute; right: 20px; top: 70px; width: 70px; height: 70px; border: 3px dashed #333; border-radius: 8px; background: rgba(255,255,255,0.3); }\n");
    html.push_str("button { width: 100%; padding: 12px; background: #fa709a; color: white; border: none; border-radius: 8px; font-size: 16px; font-weight: 600; cursor: pointer; margin-top: 16px; }\n");
    html.push_str("button:hover { background: #e8638a; }\n");
    html.push_str("</style>\n</head>\n<body>\n<div class=\"card\">\n");
    html.push_str("<h1>🧩 Puzzle Verification</h1>\n");
    html.push_str(&format!("<div class=\"bot-id\">Bot ID: {}</div>\n", ch.id));
    html.push_str("<p style=\"color: #666; margin-bottom: 8px;\">Drag the puzzle piece to the target zone</p>\n");
    html.push_str("<div class=\"challenge\">\n<div class=\"puzzle-container\">\n");
    html.push_str("<div class=\"target-zone\"></div>\n");
    html.push_str("<div class=\"puzzle-piece\" id=\"piece\" style=\"left: 20px; top: 70px;\">🔒</div>\n");
    html.push_str("</div>\n</div>\n");
    html.push_str(&format!(
        "<form method=\"POST\" action=\"{}\" id=\"verifyForm\">\n",
        VERIFY_ENDPOINT
    ));
    html.push_str(&format!(
        "<input type=\"hidden\" name=\"challenge_id\" value=\"{}\"/>\n",
        ch.id
    ));
    html.push_str("<input type=\"hidden\" name=\"answer\" id=\"answer\" value=\"\"/>\n");
    html.push_str("<button type=\"submit\">Verify</button>\n</form>\n");
    html.push_str(&suspicion_footer(ch.suspicion, status));
    html.push_str("</div>\n<script>\n");
    html.push_str("const piece = document.getElementById(\"piece\");\n");
    html.push_str(&format!("const target = \"{}\";\n", ch.answer));
    html.push_str("piece.onmousedown = (e) => {\n");
    html.push_str("  e.preventDefault();\n");
    html.push_str("  const shiftX = e.clientX - piece.getBoundingClientRect().left;\n");
    html.push_str("  const shiftY = e.clientY - piece.getBoundingClientRect().top;\n");
    html.push_str("  const move = (e) => {\n");
    html.push_str("    const container = piece.parentElement.getBoundingClientRect();\n");
    html.push_str("    let x = e.clientX - container.left - shiftX;\n");
    html.push_str("    let y = e.clientY - container.top - shiftY;\n");
    html.push_str("    x = Math.max(0, Math.min(x, container.width - 60));\n");
    html.push_str("    y = Math.max(0, Math.min(y, container.height - 60));\n");
    html.push_str("    piece.style.left = x + \"px\";\n");
    html.push_str("    piece.style.top = y + \"px\";\n");
    html.push_str("    if (x > container.width - 100 && y > 50 && y < 110) {\n");
    html.push_str("      piece.style.background = \"#4ade80\";\n      piece.textContent = \"✓\";\n");
    html.push_str("      document.getElementById(\"answer\").value = target;\n");
    html.push_str("    } else {\n");
    html.push_str("      piece.style.background = \"white\";\n      piece.textContent = \"🔒\";\n");
    html.push_str("      document.getElementById(\"answer\").value = \"\";\n");
    html.push_str("    }\n  };\n");
    html.push_str("  const up = () => {\n");
    html.push_str("    document.removeEventListener(\"mousemove\", move);\n");
    html.push_str("    document.removeEventListener(\"mouseup\", up);\n  };\n");
    html.push_str("  document.addEventListener(\"mousemove\", move);\n");
    html.push_str("  document.addEventListener(\"mouseup\", up);\n};\n");
    html.push_str("</script>\n</body>\n</html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::ChallengeStore;

    fn challenge(kind: ChallengeKind) -> Challenge {
        let store = ChallengeStore::new();
        store.create("192.0.2.1", "curl/8.0", 45, kind)
    }

    #[test]
    fn test_simple_error_escapes_message() {
        let html = render_dynamic_error_page(None, 403, "<script>alert(1)</script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("403"));
    }

    #[test]
    fn test_text_challenge_page() {
        let ch = challenge(ChallengeKind::Text);
        let html = render_dynamic_error_page(Some(&ch), 403, "Forbidden");
        assert!(html.contains(&ch.id));
        assert!(html.contains(&ch.answer));
        assert!(html.contains(VERIFY_ENDPOINT));
        assert!(html.contains("name=\"challenge_id\""));
        assert!(html.contains("name=\"answer\""));
    }

    #[test]
    fn test_click_challenge_page() {
        let ch = challenge(ChallengeKind::Click);
        let html = render_dynamic_error_page(Some(&ch), 404, "Not Found");
        assert!(html.contains(&ch.id));
        assert!(html.contains("const correct"));
        assert!(html.contains(VERIFY_ENDPOINT));
    }

    #[test]
    fn test_slider_challenge_page() {
        let ch = challenge(ChallengeKind::Slider);
        let html = render_dynamic_error_page(Some(&ch), 403, "Forbidden");
        assert!(html.contains(&ch.id));
        assert!(html.contains("puzzle-piece"));
        assert!(html.contains(&format!("const target = \"{}\";", ch.answer)));
    }

    #[test]
    fn test_none_kind_falls_back_to_simple_page() {
        let ch = challenge(ChallengeKind::None);
        let html = render_dynamic_error_page(Some(&ch), 403, "Forbidden");
        assert!(html.contains("Request Blocked"));
        assert!(!html.contains("challenge_id"));
    }
}
