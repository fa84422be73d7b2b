//! Reputation scoring and challenge store
//!
//! Suspicious clients hitting the error path are served a challenge instead
//! of the real error page. Passing a challenge marks the client IP as
//! verified for a grace window, during which it sees the configured static
//! error pages like any trusted client.
//!
//! The store holds live challenges and the verified set behind one lock;
//! a background sweeper drains expired entries every minute.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::RwLock;
use rand::RngCore;
use tokio::task::JoinHandle;
use tracing::debug;

/// Challenge lifetime
pub const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

/// Grace window after a successful verification
pub const VERIFIED_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Sweeper cadence
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Words used for text challenges
const TEXT_WORDS: [&str; 8] = [
    "sunrise", "mountain", "ocean", "forest", "desert", "river", "cloud", "thunder",
];

/// Kind of challenge to present, selected by suspicion score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    None,
    Text,
    Click,
    Slider,
}

impl ChallengeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Text => "text",
            Self::Click => "click",
            Self::Slider => "slider",
        }
    }
}

/// An issued challenge awaiting an answer
#[derive(Debug, Clone)]
pub struct Challenge {
    /// 22-character URL-safe random id
    pub id: String,
    pub kind: ChallengeKind,
    /// Expected answer in canonical form
    pub answer: String,
    pub created_at: Instant,
    pub expires_at: Instant,
    /// IP the challenge was issued for; answers from other IPs are rejected
    pub ip: String,
    pub user_agent: String,
    /// Suspicion score at issue time (0-100)
    pub suspicion: u8,
}

struct Inner {
    challenges: HashMap<String, Challenge>,
    /// IP -> last successful verification
    verified: HashMap<String, Instant>,
}

/// Store of live challenges and recently verified client IPs
pub struct ChallengeStore {
    inner: RwLock<Inner>,
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                challenges: HashMap::new(),
                verified: HashMap::new(),
            }),
        }
    }

    /// Spawn the background sweeper; runs until the handle is aborted
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            // The first tick fires immediately; skip it
            interval.tick().await;
            loop {
                interval.tick().await;
                store.sweep();
            }
        })
    }

    /// Remove expired challenges and stale verified entries
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let before = inner.challenges.len();
        inner.challenges.retain(|_, ch| now < ch.expires_at);
        inner
            .verified
            .retain(|_, t| now.duration_since(*t) < VERIFIED_WINDOW);
        let removed = before - inner.challenges.len();
        if removed > 0 {
            debug!(removed, "Swept expired challenges");
        }
    }

    /// Generate and store a new challenge for a client
    pub fn create(
        &self,
        ip: &str,
        user_agent: &str,
        suspicion: u8,
        kind: ChallengeKind,
    ) -> Challenge {
        let now = Instant::now();
        let answer = match kind {
            ChallengeKind::Text => text_answer(),
            ChallengeKind::Click => click_answer(),
            ChallengeKind::Slider => slider_answer(),
            ChallengeKind::None => String::new(),
        };

        let challenge = Challenge {
            id: generate_id(),
            kind,
            answer,
            created_at: now,
            expires_at: now + CHALLENGE_TTL,
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            suspicion,
        };

        self.inner
            .write()
            .challenges
            .insert(challenge.id.clone(), challenge.clone());
        challenge
    }

    /// Look up a live challenge by id
    pub fn get(&self, id: &str) -> Option<Challenge> {
        self.inner.read().challenges.get(id).cloned()
    }

    /// Verify an answer. On success the challenge is consumed and the IP is
    /// recorded as verified. Expired, mismatched-IP, and wrong answers all
    /// report plain `false`.
    pub fn verify(&self, id: &str, answer: &str, ip: &str) -> bool {
        let mut inner = self.inner.write();

        let challenge = match inner.challenges.get(id) {
            Some(c) => c,
            None => return false,
        };

        if Instant::now() > challenge.expires_at {
            return false;
        }
        if challenge.ip != ip {
            return false;
        }

        let correct = match challenge.kind {
            ChallengeKind::Text => {
                answer.trim().eq_ignore_ascii_case(challenge.answer.trim())
            }
            ChallengeKind::Click | ChallengeKind::Slider => answer == challenge.answer,
            ChallengeKind::None => false,
        };

        if correct {
            inner.challenges.remove(id);
            inner.verified.insert(ip.to_string(), Instant::now());
            return true;
        }

        false
    }

    /// True when the IP passed a challenge within the grace window
    pub fn is_verified(&self, ip: &str) -> bool {
        match self.inner.read().verified.get(ip) {
            Some(t) => t.elapsed() < VERIFIED_WINDOW,
            None => false,
        }
    }

    #[cfg(test)]
    fn force_expire(&self, id: &str) {
        let mut inner = self.inner.write();
        // checked_sub: an instant before boot is unrepresentable
        match Instant::now().checked_sub(Duration::from_secs(1)) {
            Some(past) => {
                if let Some(ch) = inner.challenges.get_mut(id) {
                    ch.expires_at = past;
                }
            }
            None => {
                inner.challenges.remove(id);
            }
        }
    }

    #[cfg(test)]
    fn force_verified_age(&self, ip: &str, age: Duration) {
        let mut inner = self.inner.write();
        match Instant::now().checked_sub(age) {
            Some(past) => {
                if let Some(t) = inner.verified.get_mut(ip) {
                    *t = past;
                }
            }
            // Aging past boot time is indistinguishable from eviction
            None => {
                inner.verified.remove(ip);
            }
        }
    }

    #[cfg(test)]
    fn live_challenge_count(&self) -> usize {
        self.inner.read().challenges.len()
    }
}

/// Score a request's suspicion from its user agent. Pure and capped at 100.
pub fn calculate_suspicion(user_agent: &str, _ip: &str) -> u8 {
    let mut score: u32 = 0;
    let ua = user_agent.to_lowercase();

    // Known automation signatures (counted once)
    const BOT_TOKENS: [&str; 9] = [
        "bot",
        "crawler",
        "spider",
        "scraper",
        "curl",
        "wget",
        "python",
        "go-http-client",
        "java",
    ];
    if BOT_TOKENS.iter().any(|b| ua.contains(b)) {
        score += 30;
    }

    if user_agent.is_empty() || user_agent.len() < 10 {
        score += 25;
    }
    if !ua.contains("mozilla") && !ua.contains("chrome") && !ua.contains("safari") {
        score += 15;
    }
    if ua.matches(';').count() > 10 || ua.len() > 300 {
        score += 10;
    }

    score.min(100) as u8
}

/// Pick the challenge kind for a suspicion score
pub fn kind_for_suspicion(suspicion: u8) -> ChallengeKind {
    if suspicion < 30 {
        ChallengeKind::None
    } else if suspicion < 60 {
        ChallengeKind::Text
    } else if suspicion < 80 {
        ChallengeKind::Click
    } else {
        ChallengeKind::Slider
    }
}

/// 22-character URL-safe id from 16 random bytes
fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn text_answer() -> String {
    let mut b = [0u8; 1];
    rand::thread_rng().fill_bytes(&mut b);
    TEXT_WORDS[b[0] as usize % TEXT_WORDS.len()].to_string()
}

/// 1-3 unique box indices in [0,8], serialized sorted and comma-separated
fn click_answer() -> String {
    let mut b = [0u8; 3];
    rand::thread_rng().fill_bytes(&mut b);
    let mut indices: Vec<u8> = b.iter().map(|x| x % 9).collect();
    indices.sort_unstable();
    indices.dedup();
    indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Single digit encoding tens of a slider position in [20,80]
fn slider_answer() -> String {
    let mut b = [0u8; 1];
    rand::thread_rng().fill_bytes(&mut b);
    let pos = 20 + (b[0] as usize % 60);
    (pos / 10).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_unique_and_22_chars() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 22);
        assert_eq!(b.len(), 22);
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_suspicion_scores() {
        let browser = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                       (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
        assert_eq!(calculate_suspicion(browser, "192.0.2.1"), 0);

        // curl: bot token + not a browser
        assert_eq!(calculate_suspicion("curl/7.68.0", "192.0.2.1"), 45);

        // Empty UA: short + not a browser
        assert_eq!(calculate_suspicion("", "192.0.2.1"), 40);

        // "Bot": bot token + short + not a browser
        assert_eq!(calculate_suspicion("Bot", "192.0.2.1"), 70);

        // Long but browser-looking UA
        let long = format!("Mozilla/5.0 {}", "A".repeat(300));
        assert_eq!(calculate_suspicion(&long, "192.0.2.1"), 10);

        // Semicolon spam
        let spam = format!("Mozilla {}", ";".repeat(15));
        assert_eq!(calculate_suspicion(&spam, "192.0.2.1"), 10);
    }

    #[test]
    fn test_suspicion_is_pure_and_bounded() {
        for ua in ["", "curl", "Bot;;;;;;;;;;;;;;;", &"x".repeat(500)] {
            let first = calculate_suspicion(ua, "10.0.0.1");
            assert_eq!(calculate_suspicion(ua, "10.0.0.1"), first);
            assert!(first <= 100);
        }
    }

    #[test]
    fn test_kind_boundaries() {
        assert_eq!(kind_for_suspicion(0), ChallengeKind::None);
        assert_eq!(kind_for_suspicion(29), ChallengeKind::None);
        assert_eq!(kind_for_suspicion(30), ChallengeKind::Text);
        assert_eq!(kind_for_suspicion(59), ChallengeKind::Text);
        assert_eq!(kind_for_suspicion(60), ChallengeKind::Click);
        assert_eq!(kind_for_suspicion(79), ChallengeKind::Click);
        assert_eq!(kind_for_suspicion(80), ChallengeKind::Slider);
        assert_eq!(kind_for_suspicion(100), ChallengeKind::Slider);
    }

    #[test]
    fn test_text_answer_from_word_list() {
        for _ in 0..32 {
            let answer = text_answer();
            assert!(TEXT_WORDS.contains(&answer.as_str()));
        }
    }

    #[test]
    fn test_click_answer_shape() {
        for _ in 0..32 {
            let answer = click_answer();
            let parts: Vec<u8> = answer.split(',').map(|p| p.parse().unwrap()).collect();
            assert!(!parts.is_empty() && parts.len() <= 3);
            assert!(parts.iter().all(|&i| i <= 8));
            let mut sorted = parts.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(parts, sorted);
        }
    }

    #[test]
    fn test_slider_answer_range() {
        for _ in 0..32 {
            let answer = slider_answer();
            let digit: u32 = answer.parse().unwrap();
            // Positions 20-79 map to digits 2-7
            assert!((2..=7).contains(&digit));
        }
    }

    #[test]
    fn test_challenge_ttl() {
        let store = ChallengeStore::new();
        let ch = store.create("192.0.2.1", "curl/8.0", 45, ChallengeKind::Text);
        assert_eq!(ch.expires_at - ch.created_at, CHALLENGE_TTL);
        assert!(store.get(&ch.id).is_some());
    }

    #[test]
    fn test_verify_consumes_challenge_and_marks_verified() {
        let store = ChallengeStore::new();
        let ch = store.create("192.0.2.1", "curl/8.0", 45, ChallengeKind::Text);
        assert!(!store.is_verified("192.0.2.1"));

        assert!(store.verify(&ch.id, &ch.answer, "192.0.2.1"));
        assert!(store.get(&ch.id).is_none());
        assert!(store.is_verified("192.0.2.1"));

        // A consumed challenge cannot be replayed
        assert!(!store.verify(&ch.id, &ch.answer, "192.0.2.1"));
    }

    #[test]
    fn test_verify_text_trims_and_ignores_case() {
        let store = ChallengeStore::new();
        let ch = store.create("192.0.2.1", "curl/8.0", 45, ChallengeKind::Text);
        let sloppy = format!("  {}  ", ch.answer.to_uppercase());
        assert!(store.verify(&ch.id, &sloppy, "192.0.2.1"));
    }

    #[test]
    fn test_verify_click_is_exact() {
        let store = ChallengeStore::new();
        let ch = store.create("192.0.2.1", "curl/8.0", 70, ChallengeKind::Click);
        assert!(!store.verify(&ch.id, &format!(" {}", ch.answer), "192.0.2.1"));
        assert!(store.verify(&ch.id, &ch.answer, "192.0.2.1"));
    }

    #[test]
    fn test_verify_rejects_wrong_ip() {
        let store = ChallengeStore::new();
        let ch = store.create("192.0.2.1", "curl/8.0", 45, ChallengeKind::Text);
        assert!(!store.verify(&ch.id, &ch.answer, "198.51.100.9"));
        // Challenge survives a failed attempt
        assert!(store.get(&ch.id).is_some());
        assert!(!store.is_verified("198.51.100.9"));
    }

    #[test]
    fn test_verify_rejects_expired() {
        let store = ChallengeStore::new();
        let ch = store.create("192.0.2.1", "curl/8.0", 45, ChallengeKind::Text);
        store.force_expire(&ch.id);
        assert!(!store.verify(&ch.id, &ch.answer, "192.0.2.1"));
    }

    #[test]
    fn test_verify_unknown_id() {
        let store = ChallengeStore::new();
        assert!(!store.verify("nope", "whatever", "192.0.2.1"));
    }

    #[test]
    fn test_verified_window_expires() {
        let store = ChallengeStore::new();
        let ch = store.create("192.0.2.1", "curl/8.0", 45, ChallengeKind::Text);
        assert!(store.verify(&ch.id, &ch.answer, "192.0.2.1"));
        assert!(store.is_verified("192.0.2.1"));

        store.force_verified_age("192.0.2.1", VERIFIED_WINDOW + Duration::from_secs(1));
        // Lazy re-check: lookup alone reports false even before the sweep
        assert!(!store.is_verified("192.0.2.1"));

        store.sweep();
        assert!(!store.is_verified("192.0.2.1"));
    }

    #[test]
    fn test_sweep_removes_expired_challenges() {
        let store = ChallengeStore::new();
        let a = store.create("192.0.2.1", "curl/8.0", 45, ChallengeKind::Text);
        let _b = store.create("192.0.2.2", "curl/8.0", 45, ChallengeKind::Text);
        store.force_expire(&a.id);
        store.sweep();
        assert_eq!(store.live_challenge_count(), 1);
        assert!(store.get(&a.id).is_none());
    }
}
