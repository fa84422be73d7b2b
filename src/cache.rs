//! Response cache: bounded LRU with TTL
//!
//! Keyed on `method|host|path?query`. Only the caller decides cacheability
//! (safe method, no Upgrade); the store enforces the body-size bound, strips
//! hop-by-hop headers, and owns deep copies of everything it holds. All
//! operations serialize through one mutex because a lookup also touches the
//! recency order.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use parking_lot::Mutex;

use crate::envelope::RequestEnvelope;

/// Hop-by-hop headers (RFC 7230) never stored or replayed
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// A cached response handed back to the pipeline. The body is a cheap
/// reference-counted clone; callers cannot mutate the stored bytes.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

struct Entry {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    expires_at: Instant,
    /// Recency stamp; index into the recency map
    stamp: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Recency index: oldest stamp first
    recency: BTreeMap<u64, String>,
    clock: u64,
}

/// Bounded in-memory LRU response cache with TTL
pub struct ResponseCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
    max_body_bytes: usize,
}

impl ResponseCache {
    /// Create a cache; non-positive bounds fall back to the defaults
    /// (60 s TTL, 1024 entries, 1 MiB bodies)
    pub fn new(ttl: Duration, max_entries: usize, max_body_bytes: usize) -> Self {
        let ttl = if ttl.is_zero() {
            Duration::from_secs(60)
        } else {
            ttl
        };
        let max_entries = if max_entries == 0 { 1024 } else { max_entries };
        let max_body_bytes = if max_body_bytes == 0 {
            1 << 20
        } else {
            max_body_bytes
        };

        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                clock: 0,
            }),
            ttl,
            max_entries,
            max_body_bytes,
        }
    }

    /// Maximum cacheable body size in bytes
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Look up a key. Expired entries are evicted in place; hits move to MRU.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) => Instant::now() > entry.expires_at,
            None => return None,
        };

        if expired {
            if let Some(entry) = inner.entries.remove(key) {
                inner.recency.remove(&entry.stamp);
            }
            return None;
        }

        inner.clock += 1;
        let stamp = inner.clock;
        let entry = inner.entries.get_mut(key).expect("checked above");
        let old_stamp = entry.stamp;
        entry.stamp = stamp;
        let response = CachedResponse {
            status: entry.status,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
        };
        inner.recency.remove(&old_stamp);
        inner.recency.insert(stamp, key.to_string());

        Some(response)
    }

    /// Insert or update an entry. Oversized bodies are rejected; existing
    /// keys are updated in place and moved to MRU; the LRU entry is evicted
    /// once the entry bound is exceeded.
    pub fn set(&self, key: &str, status: StatusCode, headers: &HeaderMap, body: &[u8]) {
        if body.len() > self.max_body_bytes {
            return;
        }

        let mut inner = self.inner.lock();
        inner.clock += 1;
        let stamp = inner.clock;

        let entry = Entry {
            status,
            headers: clone_headers(headers),
            body: Bytes::copy_from_slice(body),
            expires_at: Instant::now() + self.ttl,
            stamp,
        };

        if let Some(old) = inner.entries.insert(key.to_string(), entry) {
            inner.recency.remove(&old.stamp);
        }
        inner.recency.insert(stamp, key.to_string());

        while inner.entries.len() > self.max_entries {
            let oldest = inner.recency.iter().next().map(|(s, k)| (*s, k.clone()));
            match oldest {
                Some((stamp, key)) => {
                    inner.recency.remove(&stamp);
                    inner.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the cache key for a request
pub fn cache_key(env: &RequestEnvelope) -> String {
    format!(
        "{}|{}|{}?{}",
        env.method, env.host, env.path, env.raw_query
    )
}

/// Deep-copy a header map, dropping hop-by-hop headers
fn clone_headers(headers: &HeaderMap) -> HeaderMap {
    let mut cloned = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        cloned.append(name.clone(), value.clone());
    }
    cloned
}
