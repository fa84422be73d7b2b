//! WAF rule engine
//!
//! Rules live in the config snapshot and the embedded store; the engine
//! evaluates them in priority order against the request envelope. Expression
//! programs are compiled once and cached keyed by the expression string; the
//! cache is dropped whenever the ruleset version advances (snapshots are
//! atomic, so there is no per-rule invalidation).
//!
//! Failure semantics are deliberate: a rule that fails to compile or to
//! evaluate is skipped, and a store outage yields Pass. The WAF must not
//! turn an outage into a denial of service of its own.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::envelope::RequestEnvelope;
use crate::expr::{EvalContext, Program};

/// A WAF rule as loaded from the store
#[derive(Debug, Clone, PartialEq)]
pub struct WafRule {
    /// Unique rule name
    pub name: String,
    /// Expression source
    pub expression: String,
    /// "BLOCK" or "ALLOW" (case-insensitive)
    pub action: String,
    /// Higher priority rules are evaluated first
    pub priority: i64,
}

/// Outcome of evaluating the ruleset against one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No blocking rule matched
    Pass,
    /// A blocking rule matched; carries the rule name
    Block { rule: String },
}

struct ProgramCache {
    /// Snapshot version the cached programs were compiled against
    version: i64,
    programs: HashMap<String, Arc<Program>>,
}

/// Rule engine with a version-scoped compiled-program cache
pub struct WafEngine {
    cache: RwLock<ProgramCache>,
}

impl Default for WafEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WafEngine {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(ProgramCache {
                version: -1,
                programs: HashMap::new(),
            }),
        }
    }

    /// Evaluate the ruleset against the envelope.
    ///
    /// `rules` must already be ordered by priority descending with stable
    /// tie-breaking; `ruleset_version` scopes the compiled-program cache.
    pub fn evaluate(
        &self,
        env: &RequestEnvelope,
        rules: &[WafRule],
        ruleset_version: i64,
        debug_logs: bool,
    ) -> Decision {
        if rules.is_empty() {
            return Decision::Pass;
        }

        {
            let mut cache = self.cache.write();
            if cache.version != ruleset_version {
                debug!(
                    old_version = cache.version,
                    new_version = ruleset_version,
                    "Dropping compiled WAF rule cache"
                );
                cache.programs.clear();
                cache.version = ruleset_version;
            }
        }

        let ctx = EvalContext {
            ip: &env.client_ip,
            method: &env.method,
            path: &env.path,
            headers: &env.headers,
        };

        for rule in rules {
            let program = match self.program_for(rule) {
                Some(p) => p,
                None => continue,
            };

            let matched = match program.eval_bool(&ctx) {
                Ok(m) => m,
                Err(e) => {
                    error!(rule = %rule.name, error = %e, "Error running WAF rule");
                    continue;
                }
            };

            if debug_logs {
                debug!(
                    rule = %rule.name,
                    expression = %rule.expression,
                    matched,
                    "WAF rule evaluation"
                );
            }

            if matched {
                let action = rule.action.to_ascii_uppercase();
                if action == "BLOCK" {
                    return Decision::Block {
                        rule: rule.name.clone(),
                    };
                }
                if action == "ALLOW" {
                    // An explicit allow terminates the scan.
                    return Decision::Pass;
                }
                warn!(rule = %rule.name, action = %rule.action, "Unknown WAF action; skipping");
            }
        }

        Decision::Pass
    }

    /// Fetch the compiled program for a rule, compiling and caching on miss.
    /// Returns None (and logs) when the expression does not compile.
    fn program_for(&self, rule: &WafRule) -> Option<Arc<Program>> {
        if let Some(program) = self.cache.read().programs.get(&rule.expression) {
            return Some(program.clone());
        }

        match Program::compile(&rule.expression) {
            Ok(program) => {
                let program = Arc::new(program);
                self.cache
                    .write()
                    .programs
                    .insert(rule.expression.clone(), program.clone());
                Some(program)
            }
            Err(e) => {
                error!(rule = %rule.name, error = %e, "Invalid WAF rule expression");
                None
            }
        }
    }

    #[cfg(test)]
    fn cached_program_count(&self) -> usize {
        self.cache.read().programs.len()
    }
}
