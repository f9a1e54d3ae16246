//! Fixed-window rate limiting.
//!
//! Policies are compiled with the rest of the policy snapshot; counters live
//! in a `CounterStore` that outlives reloads. A window is
//! `[window_start, window_start + window_seconds)`. A store failure counts as
//! an exceeded quota.

pub mod file;
pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use hookguard_core::error::{HookGuardError, Result};
use hookguard_core::{Invocation, InvocationKind};

use crate::config::{KeyScope, RateLimitConfig};
use crate::policy::rules::compile_pattern;

pub use file::FileCounterStore;
pub use memory::InMemoryCounterStore;

/// Compiled rate-limit policy.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub name: String,
    pub kind: InvocationKind,
    pub max_calls: u32,
    pub window_seconds: u64,
    pub per: KeyScope,
    key_pattern: Regex,
}

impl RateLimitPolicy {
    /// Counter key for `inv`, or `None` when the policy does not apply.
    pub fn key_for(&self, inv: &Invocation) -> Option<String> {
        if inv.kind() != self.kind || !self.key_pattern.is_match(inv.identifier()) {
            return None;
        }
        Some(match self.per {
            KeyScope::Policy => self.name.clone(),
            KeyScope::Identifier => format!("{}:{}", self.name, inv.identifier()),
        })
    }
}

/// Saturating seconds → `Duration`.
pub(crate) fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Key patterns match from the start of the identifier.
pub fn compile_policies(raw: &[RateLimitConfig]) -> Result<Vec<RateLimitPolicy>> {
    let mut out = Vec::with_capacity(raw.len());
    for (index, p) in raw.iter().enumerate() {
        let key_pattern = compile_pattern(&p.key_pattern, p.case_insensitive, true).map_err(
            |reason| HookGuardError::RuleLoad {
                index,
                name: format!("rate_limits/{}", p.name),
                reason,
            },
        )?;
        out.push(RateLimitPolicy {
            name: p.name.clone(),
            kind: p.kind.into(),
            max_calls: p.max_calls,
            window_seconds: p.window_seconds,
            per: p.per,
            key_pattern,
        });
    }
    Ok(out)
}

/// Result of one check-and-consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
}

/// Live counter for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCounter {
    pub key: String,
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub window_seconds: u64,
}

impl RateCounter {
    pub fn new(key: impl Into<String>, now: DateTime<Utc>, window_seconds: u64) -> Self {
        Self {
            key: key.into(),
            window_start: now,
            count: 0,
            window_seconds,
        }
    }

    fn window_end(&self) -> DateTime<Utc> {
        self.window_start
            .checked_add_signed(seconds(self.window_seconds))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Reset if `now` left the window, then consume one slot if any remain.
    pub fn try_consume(&mut self, max_calls: u32, window_seconds: u64, now: DateTime<Utc>) -> RateDecision {
        self.window_seconds = window_seconds;
        if now < self.window_start || now >= self.window_end() {
            self.window_start = now;
            self.count = 0;
        }
        if self.count >= max_calls {
            return RateDecision {
                allowed: false,
                remaining: 0,
            };
        }
        self.count += 1;
        RateDecision {
            allowed: true,
            remaining: max_calls - self.count,
        }
    }

    /// Window over and idle for at least `retention`.
    pub fn is_stale(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        match self.window_end().checked_add_signed(retention) {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

/// Shared counter storage. Implementations must make check-and-increment
/// indivisible per key.
pub trait CounterStore: Send + Sync {
    fn check_and_consume(
        &self,
        key: &str,
        max_calls: u32,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<RateDecision>;

    /// Number of live counters (diagnostics).
    fn len(&self) -> Result<usize>;
}

/// Outcome of one applicable policy for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateOutcome {
    Allowed {
        policy: String,
        remaining: u32,
    },
    Exceeded {
        policy: String,
        max_calls: u32,
        window_seconds: u64,
    },
    StoreFailed {
        policy: String,
        error: String,
    },
}

impl RateOutcome {
    pub fn is_rejection(&self) -> bool {
        !matches!(self, RateOutcome::Allowed { .. })
    }

    pub fn policy(&self) -> &str {
        match self {
            RateOutcome::Allowed { policy, .. }
            | RateOutcome::Exceeded { policy, .. }
            | RateOutcome::StoreFailed { policy, .. } => policy,
        }
    }
}

/// Applies policies against a counter store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    pub fn check_and_consume(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<RateDecision> {
        self.store
            .check_and_consume(key, policy.max_calls, policy.window_seconds, now)
    }

    /// Evaluate every applicable policy independently.
    pub fn evaluate(
        &self,
        policies: &[RateLimitPolicy],
        inv: &Invocation,
        now: DateTime<Utc>,
    ) -> Vec<RateOutcome> {
        let mut out = Vec::new();
        for policy in policies {
            let Some(key) = policy.key_for(inv) else { continue };
            let outcome = match self.check_and_consume(&key, policy, now) {
                Ok(d) if d.allowed => RateOutcome::Allowed {
                    policy: policy.name.clone(),
                    remaining: d.remaining,
                },
                Ok(_) => RateOutcome::Exceeded {
                    policy: policy.name.clone(),
                    max_calls: policy.max_calls,
                    window_seconds: policy.window_seconds,
                },
                Err(e) => {
                    tracing::error!(policy = %policy.name, key = %key, error = %e, "rate limit store failed; failing closed");
                    RateOutcome::StoreFailed {
                        policy: policy.name.clone(),
                        error: e.to_string(),
                    }
                }
            };
            out.push(outcome);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleKind;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn policy(per: KeyScope) -> RateLimitPolicy {
        compile_policies(&[RateLimitConfig {
            name: "openai".into(),
            kind: RuleKind::ToolCall,
            key_pattern: "mcp__openai__.*".into(),
            max_calls: 3,
            window_seconds: 60,
            per,
            case_insensitive: false,
        }])
        .unwrap()
        .remove(0)
    }

    struct BrokenStore;

    impl CounterStore for BrokenStore {
        fn check_and_consume(&self, _: &str, _: u32, _: u64, _: DateTime<Utc>) -> Result<RateDecision> {
            Err(HookGuardError::RateLimitStore("disk on fire".into()))
        }
        fn len(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn counter_fixed_window() {
        let mut c = RateCounter::new("k", t(0), 60);
        assert_eq!(c.try_consume(2, 60, t(0)), RateDecision { allowed: true, remaining: 1 });
        assert_eq!(c.try_consume(2, 60, t(10)), RateDecision { allowed: true, remaining: 0 });
        assert!(!c.try_consume(2, 60, t(59)).allowed);
        assert_eq!(c.count, 2, "rejections do not increment");

        let d = c.try_consume(2, 60, t(60));
        assert!(d.allowed);
        assert_eq!(c.count, 1);
        assert_eq!(c.window_start, t(60));
    }

    #[test]
    fn staleness_starts_after_window_end() {
        let c = RateCounter::new("k", t(0), 60);
        assert!(!c.is_stale(t(100), Duration::seconds(60)));
        assert!(c.is_stale(t(120), Duration::seconds(60)));
    }

    #[test]
    fn key_scopes() {
        let inv = Invocation::tool_call("mcp__openai__chat", Default::default());
        assert_eq!(policy(KeyScope::Policy).key_for(&inv).as_deref(), Some("openai"));
        assert_eq!(
            policy(KeyScope::Identifier).key_for(&inv).as_deref(),
            Some("openai:mcp__openai__chat")
        );
        let other = Invocation::tool_call("mcp__github__list", Default::default());
        assert!(policy(KeyScope::Policy).key_for(&other).is_none());
        let cmd = Invocation::command("bash", "mcp__openai__chat");
        assert!(policy(KeyScope::Policy).key_for(&cmd).is_none());
    }

    #[test]
    fn store_failure_fails_closed() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore));
        let inv = Invocation::tool_call("mcp__openai__chat", Default::default());
        let out = limiter.evaluate(&[policy(KeyScope::Policy)], &inv, t(0));
        assert_eq!(out.len(), 1);
        assert!(out[0].is_rejection());
        assert!(matches!(out[0], RateOutcome::StoreFailed { .. }));
    }

    #[test]
    fn bad_key_pattern_is_rule_load_error() {
        let err = compile_policies(&[RateLimitConfig {
            name: "bad".into(),
            kind: RuleKind::ToolCall,
            key_pattern: "mcp__[".into(),
            max_calls: 1,
            window_seconds: 1,
            per: KeyScope::Policy,
            case_insensitive: false,
        }])
        .unwrap_err();
        assert_eq!(err.code().as_str(), "RULE_LOAD");
    }
}
