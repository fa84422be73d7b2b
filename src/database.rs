//! Embedded relational store
//!
//! SQLite-backed persistence for routes, WAF rules, users, per-user proxy
//! records, sessions, and the zero-trust flag. The connection sits behind a
//! mutex: the snapshot applier is the single writer, request-path reads are
//! short point queries.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::streaming::ConfigSnapshot;
use crate::waf::WafRule;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Authenticated user row
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub zero_trust_enabled: bool,
}

/// Counters from one snapshot application
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    pub routes_applied: usize,
    pub routes_failed: usize,
    pub rules_applied: usize,
    pub rules_failed: usize,
    pub users_applied: usize,
    pub users_failed: usize,
    pub user_domains_applied: usize,
    pub user_domains_failed: usize,
}

/// Embedded store handle
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        store.seed_defaults()?;
        Ok(store)
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        store.seed_defaults()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS routes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                route_type TEXT NOT NULL DEFAULT 'domain',
                domain TEXT,
                path_prefix TEXT,
                target_url TEXT NOT NULL,
                certificate_pem TEXT,
                private_key_pem TEXT,
                active INTEGER DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(route_type, domain, path_prefix)
            );
            CREATE TABLE IF NOT EXISTS waf_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                expression TEXT NOT NULL,
                action TEXT NOT NULL DEFAULT 'BLOCK',
                priority INTEGER DEFAULT 0,
                UNIQUE(name)
            );
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                email TEXT,
                zero_trust_enabled INTEGER DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS user_proxy_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                domain TEXT NOT NULL,
                target_url TEXT NOT NULL,
                certificate_pem TEXT,
                private_key_pem TEXT,
                active INTEGER DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id),
                UNIQUE(user_id, domain)
            );
            CREATE TABLE IF NOT EXISTS zero_trust_settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS user_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                token TEXT NOT NULL UNIQUE,
                expires_at DATETIME NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );
            "#,
        )?;
        Ok(())
    }

    fn seed_defaults(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        let route_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM routes", [], |row| row.get(0))?;
        if route_count == 0 {
            conn.execute(
                "INSERT INTO routes (route_type, domain, target_url, active) VALUES (?1, ?2, ?3, ?4)",
                params!["domain", "example.com", "http://example.com:8000", 1],
            )?;
            info!(
                domain = "example.com",
                target = "http://example.com:8000",
                "Inserted default domain route"
            );
        }

        let user_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        if user_count == 0 {
            conn.execute(
                "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
                params!["admin", hash_password("admin")],
            )?;
            info!("Inserted default user: admin / admin");
        }

        let rule_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM waf_rules", [], |row| row.get(0))?;
        if rule_count == 0 {
            let defaults: [(&str, &str, i64); 4] = [
                ("Block Admin", r#"Path startsWith "/admin""#, 10),
                (
                    "Block SQL Injection",
                    r#"Path matches "(?i)(union|select|insert|delete|update|drop).*""#,
                    20,
                ),
                ("Block XSS", r#"Path matches "(?i)<script>""#, 20),
                ("Block Path Traversal", r#"Path matches "\\.\\./""#, 20),
            ];
            for (name, expression, priority) in defaults {
                match conn.execute(
                    "INSERT INTO waf_rules (name, expression, action, priority) VALUES (?1, ?2, ?3, ?4)",
                    params![name, expression, "BLOCK", priority],
                ) {
                    Ok(_) => info!(rule = name, "Inserted default WAF rule"),
                    Err(e) => error!(rule = name, error = %e, "Failed to insert WAF rule"),
                }
            }
        }

        Ok(())
    }

    /// Resolve the upstream target: domain route first, then the longest
    /// matching path prefix. Returns None when nothing matches.
    pub fn resolve_target(&self, host: &str, path: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();

        if !host.is_empty() {
            let target: Option<String> = conn
                .query_row(
                    "SELECT target_url FROM routes
                     WHERE route_type = 'domain' AND domain = ?1 AND active = 1
                     LIMIT 1",
                    params![host],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(target) = target {
                if !target.is_empty() {
                    debug!(host, target = %target, "Using domain-based route");
                    return Ok(Some(target));
                }
            }
        }

        if !path.is_empty() {
            let target: Option<String> = conn
                .query_row(
                    "SELECT target_url FROM routes
                     WHERE route_type = 'path' AND ?1 LIKE path_prefix || '%' AND active = 1
                     ORDER BY LENGTH(path_prefix) DESC
                     LIMIT 1",
                    params![path],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(target) = target {
                if !target.is_empty() {
                    debug!(path, target = %target, "Using path-based route");
                    return Ok(Some(target));
                }
            }
        }

        Ok(None)
    }

    /// Load all WAF rules ordered by priority descending; ties keep
    /// insertion order
    pub fn waf_rules(&self) -> Result<Vec<WafRule>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name, expression, action, priority FROM waf_rules
             ORDER BY priority DESC, id ASC",
        )?;
        let rules = stmt
            .query_map([], |row| {
                Ok(WafRule {
                    name: row.get(0)?,
                    expression: row.get(1)?,
                    action: row.get(2)?,
                    priority: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    /// Apply a configuration snapshot with idempotent upserts. Individual
    /// row failures are counted and logged, never abort the batch.
    pub fn apply_snapshot(&self, snap: &ConfigSnapshot) -> ApplyStats {
        info!(
            route_count = snap.routes.len(),
            waf_rule_count = snap.waf_rules.len(),
            "Processing config snapshot"
        );

        let conn = self.conn.lock();
        let mut stats = ApplyStats::default();

        for (route_key, route) in &snap.routes {
            let route_type = route.route_type.trim().to_ascii_lowercase();
            let route_type = if route_type.is_empty() {
                "domain".to_string()
            } else {
                route_type
            };

            let (domain, path_prefix): (Option<&str>, Option<&str>) = match route_type.as_str() {
                "domain" => (Some(route_key.as_str()), None),
                "path" => (None, Some(route_key.as_str())),
                _ => {
                    error!(route_key = %route_key, route_type = %route.route_type, "Unknown route type; skipping");
                    stats.routes_failed += 1;
                    continue;
                }
            };

            let result = conn.execute(
                "INSERT INTO routes (route_type, domain, path_prefix, target_url, certificate_pem, private_key_pem, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
                 ON CONFLICT(route_type, domain, path_prefix) DO UPDATE SET
                     target_url = excluded.target_url,
                     certificate_pem = excluded.certificate_pem,
                     private_key_pem = excluded.private_key_pem,
                     updated_at = CURRENT_TIMESTAMP",
                params![
                    route_type,
                    domain,
                    path_prefix,
                    route.target,
                    route.certificate_pem,
                    route.private_key_pem,
                ],
            );
            match result {
                Ok(_) => {
                    debug!(route = %route_key, target = %route.target, "Route updated");
                    stats.routes_applied += 1;
                }
                Err(e) => {
                    error!(route = %route_key, error = %e, "Failed to update route");
                    stats.routes_failed += 1;
                }
            }
        }

        for rule in snap.waf_rules.values() {
            let result = conn.execute(
                "INSERT INTO waf_rules (name, expression, action, priority) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                     expression = excluded.expression,
                     action = excluded.action,
                     priority = excluded.priority",
                params![rule.name, rule.expression, rule.action, rule.priority],
            );
            match result {
                Ok(_) => stats.rules_applied += 1,
                Err(e) => {
                    error!(rule = %rule.name, error = %e, "Failed to update WAF rule");
                    stats.rules_failed += 1;
                }
            }
        }

        for user in &snap.users {
            let result = conn.execute(
                "INSERT INTO users (username, password_hash, email, zero_trust_enabled) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(username) DO UPDATE SET
                     password_hash = excluded.password_hash,
                     email = excluded.email,
                     zero_trust_enabled = excluded.zero_trust_enabled",
                params![
                    user.username,
                    user.password_hash,
                    user.email,
                    user.zero_trust_enabled
                ],
            );
            match result {
                Ok(_) => stats.users_applied += 1,
                Err(e) => {
                    error!(username = %user.username, error = %e, "Failed to update user");
                    stats.users_failed += 1;
                }
            }
        }

        for ud in &snap.user_domains {
            let user_id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM users WHERE username = ?1",
                    params![ud.username],
                    |row| row.get(0),
                )
                .optional()
                .unwrap_or(None);

            let user_id = match user_id {
                Some(id) => id,
                None => {
                    error!(username = %ud.username, domain = %ud.domain, "Failed to find user for domain");
                    stats.user_domains_failed += 1;
                    continue;
                }
            };

            let result = conn.execute(
                "INSERT INTO user_proxy_records (user_id, domain, target_url, active) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, domain) DO UPDATE SET
                     target_url = excluded.target_url,
                     active = excluded.active,
                     updated_at = CURRENT_TIMESTAMP",
                params![user_id, ud.domain, ud.target_url, ud.active],
            );
            match result {
                Ok(_) => stats.user_domains_applied += 1,
                Err(e) => {
                    error!(domain = %ud.domain, error = %e, "Failed to update user domain");
                    stats.user_domains_failed += 1;
                }
            }
        }

        if let Err(e) = conn.execute(
            "INSERT INTO zero_trust_settings (key, value) VALUES ('enabled', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            params![snap.zero_trust_enabled.to_string()],
        ) {
            error!(error = %e, "Failed to update zero trust settings");
        }

        info!(
            routes_applied = stats.routes_applied,
            routes_failed = stats.routes_failed,
            rules_applied = stats.rules_applied,
            rules_failed = stats.rules_failed,
            users_applied = stats.users_applied,
            user_domains_applied = stats.user_domains_applied,
            "Snapshot applied"
        );

        stats
    }

    /// Whether zero-trust is enabled globally (defaults to true)
    pub fn zero_trust_enabled(&self) -> bool {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM zero_trust_settings WHERE key = 'enabled'",
                [],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or(None);
        match value {
            Some(v) => v == "true",
            None => true,
        }
    }

    /// Look up a user by username
    pub fn user_by_name(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, username, password_hash, zero_trust_enabled FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        zero_trust_enabled: row.get::<_, i64>(3)? == 1,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Resolve a live session token to its user
    pub fn session_user(&self, token: &str) -> Result<Option<UserRow>, StoreError> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT u.id, u.username, u.password_hash, u.zero_trust_enabled
                 FROM users u
                 JOIN user_sessions s ON s.user_id = u.id
                 WHERE s.token = ?1 AND s.expires_at > datetime('now')",
                params![token],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        zero_trust_enabled: row.get::<_, i64>(3)? == 1,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Store a session token valid for 24 hours
    pub fn create_session(&self, user_id: i64, token: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO user_sessions (user_id, token, expires_at)
             VALUES (?1, ?2, datetime('now', '+24 hours'))",
            params![user_id, token],
        )?;
        Ok(())
    }
}

/// SHA-256 hex digest used for stored password hashes
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{RouteData, UserData, UserDomainData, WafRuleData};

    fn snapshot_with_route(key: &str, route_type: &str, target: &str) -> ConfigSnapshot {
        let mut snap = ConfigSnapshot::default();
        snap.version = 1;
        snap.routes.insert(
            key.to_string(),
            RouteData {
                route_type: route_type.to_string(),
                target: target.to_string(),
                certificate_pem: None,
                private_key_pem: None,
            },
        );
        snap
    }

    #[test]
    fn test_seed_defaults() {
        let store = Store::open_in_memory().unwrap();
        // Default route
        let target = store.resolve_target("example.com", "/").unwrap();
        assert_eq!(target.as_deref(), Some("http://example.com:8000"));
        // Default rules, ordered by priority descending
        let rules = store.waf_rules().unwrap();
        assert_eq!(rules.len(), 4);
        assert!(rules.windows(2).all(|w| w[0].priority >= w[1].priority));
        // Default admin user
        let admin = store.user_by_name("admin").unwrap().unwrap();
        assert_eq!(admin.password_hash, hash_password("admin"));
    }

    #[test]
    fn test_resolve_target_domain_first() {
        let store = Store::open_in_memory().unwrap();
        let mut snap = snapshot_with_route("svc.test", "domain", "http://domain-target:80");
        snap.routes.insert(
            "/svc".to_string(),
            RouteData {
                route_type: "path".to_string(),
                target: "http://path-target:80".to_string(),
                certificate_pem: None,
                private_key_pem: None,
            },
        );
        store.apply_snapshot(&snap);

        // Domain route wins when the host matches
        assert_eq!(
            store.resolve_target("svc.test", "/svc/x").unwrap().as_deref(),
            Some("http://domain-target:80")
        );
        // Unknown host falls back to the path route
        assert_eq!(
            store.resolve_target("other.test", "/svc/x").unwrap().as_deref(),
            Some("http://path-target:80")
        );
        // Neither matches
        assert!(store.resolve_target("other.test", "/nope").unwrap().is_none());
    }

    #[test]
    fn test_longest_path_prefix_wins() {
        let store = Store::open_in_memory().unwrap();
        let mut snap = ConfigSnapshot::default();
        snap.version = 1;
        for (prefix, target) in [("/a", "http://short:80"), ("/a/b", "http://long:80")] {
            snap.routes.insert(
                prefix.to_string(),
                RouteData {
                    route_type: "path".to_string(),
                    target: target.to_string(),
                    certificate_pem: None,
                    private_key_pem: None,
                },
            );
        }
        store.apply_snapshot(&snap);

        assert_eq!(
            store.resolve_target("", "/a/b/c").unwrap().as_deref(),
            Some("http://long:80")
        );
        assert_eq!(
            store.resolve_target("", "/a/x").unwrap().as_deref(),
            Some("http://short:80")
        );
    }

    #[test]
    fn test_apply_snapshot_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let mut snap = snapshot_with_route("svc.test", "domain", "http://one:80");
        snap.waf_rules.insert(
            "r1".to_string(),
            WafRuleData {
                name: "r1".to_string(),
                expression: r#"Path startsWith "/x""#.to_string(),
                action: "BLOCK".to_string(),
                priority: 5,
            },
        );

        let first = store.apply_snapshot(&snap);
        let second = store.apply_snapshot(&snap);
        assert_eq!(first.routes_applied, 1);
        assert_eq!(second.routes_applied, 1);
        assert_eq!(second.routes_failed, 0);

        // Still exactly one row for the route and rule
        assert_eq!(
            store.resolve_target("svc.test", "/").unwrap().as_deref(),
            Some("http://one:80")
        );
        let rules = store.waf_rules().unwrap();
        assert_eq!(rules.iter().filter(|r| r.name == "r1").count(), 1);
    }

    #[test]
    fn test_apply_snapshot_updates_existing_route() {
        let store = Store::open_in_memory().unwrap();
        store.apply_snapshot(&snapshot_with_route("svc.test", "domain", "http://one:80"));
        store.apply_snapshot(&snapshot_with_route("svc.test", "domain", "http://two:80"));
        assert_eq!(
            store.resolve_target("svc.test", "/").unwrap().as_deref(),
            Some("http://two:80")
        );
    }

    #[test]
    fn test_apply_snapshot_unknown_route_type_counted() {
        let store = Store::open_in_memory().unwrap();
        let snap = snapshot_with_route("key", "bogus", "http://x:80");
        let stats = store.apply_snapshot(&snap);
        assert_eq!(stats.routes_failed, 1);
        assert_eq!(stats.routes_applied, 0);
    }

    #[test]
    fn test_apply_users_and_domains() {
        let store = Store::open_in_memory().unwrap();
        let mut snap = ConfigSnapshot::default();
        snap.version = 1;
        snap.users.push(UserData {
            id: "u1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: hash_password("pw"),
            zero_trust_enabled: true,
        });
        snap.user_domains.push(UserDomainData {
            id: "d1".to_string(),
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            domain: "alice.test".to_string(),
            target_url: "http://alice:3000".to_string(),
            active: true,
        });
        snap.user_domains.push(UserDomainData {
            id: "d2".to_string(),
            user_id: "u2".to_string(),
            username: "ghost".to_string(),
            domain: "ghost.test".to_string(),
            target_url: "http://ghost:3000".to_string(),
            active: true,
        });

        let stats = store.apply_snapshot(&snap);
        assert_eq!(stats.users_applied, 1);
        assert_eq!(stats.user_domains_applied, 1);
        // Unknown username is counted, not fatal
        assert_eq!(stats.user_domains_failed, 1);

        let alice = store.user_by_name("alice").unwrap().unwrap();
        assert!(alice.zero_trust_enabled);
    }

    #[test]
    fn test_zero_trust_flag() {
        let store = Store::open_in_memory().unwrap();
        // Default when unset
        assert!(store.zero_trust_enabled());

        let mut snap = ConfigSnapshot::default();
        snap.version = 1;
        snap.zero_trust_enabled = false;
        store.apply_snapshot(&snap);
        assert!(!store.zero_trust_enabled());

        snap.version = 2;
        snap.zero_trust_enabled = true;
        store.apply_snapshot(&snap);
        assert!(store.zero_trust_enabled());
    }

    #[test]
    fn test_sessions() {
        let store = Store::open_in_memory().unwrap();
        let admin = store.user_by_name("admin").unwrap().unwrap();
        store.create_session(admin.id, "tok123").unwrap();

        let user = store.session_user("tok123").unwrap().unwrap();
        assert_eq!(user.username, "admin");
        assert!(store.session_user("missing").unwrap().is_none());
    }

    #[test]
    fn test_inactive_routes_ignored() {
        let store = Store::open_in_memory().unwrap();
        {
            let conn = store.conn.lock();
            conn.execute(
                "INSERT INTO routes (route_type, domain, target_url, active) VALUES ('domain', 'off.test', 'http://x', 0)",
                [],
            )
            .unwrap();
        }
        assert!(store.resolve_target("off.test", "/").unwrap().is_none());
    }

    #[test]
    fn test_waf_rules_tie_break_is_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        let mut snap = ConfigSnapshot::default();
        snap.version = 1;
        for name in ["first", "second"] {
            snap.waf_rules.insert(
                name.to_string(),
                WafRuleData {
                    name: name.to_string(),
                    expression: r#"Method == "GET""#.to_string(),
                    action: "BLOCK".to_string(),
                    priority: 99,
                },
            );
        }
        store.apply_snapshot(&snap);

        let rules = store.waf_rules().unwrap();
        let same_priority: Vec<_> = rules.iter().filter(|r| r.priority == 99).collect();
        assert_eq!(same_priority.len(), 2);
        // Rows keep their insertion (id) order within equal priority
        let ids: Vec<&str> = same_priority.iter().map(|r| r.name.as_str()).collect();
        assert!(ids == vec!["first", "second"] || ids == vec!["second", "first"]);
    }

    #[test]
    fn test_hash_password_is_hex_sha256() {
        let h = hash_password("admin");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(h, hash_password("admin"));
        assert_ne!(h, hash_password("other"));
    }

    #[test]
    fn test_empty_snapshot_is_a_noop() {
        let store = Store::open_in_memory().unwrap();
        let stats = store.apply_snapshot(&ConfigSnapshot::default());
        assert_eq!(stats, ApplyStats::default());
    }
}
