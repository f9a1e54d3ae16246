use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use hookguard_core::error::{HookGuardError, Result};
use hookguard_core::protocol::HookInput;
use hookguard_core::{Decision, Invocation};

use crate::audit::{AuditRecord, AuditSink};
use crate::config::{AuditScope, PolicyConfig};
use crate::obs::metrics::EngineMetrics;
use crate::ratelimit::{compile_policies, RateLimitPolicy, RateLimiter, RateOutcome};

use super::matcher;
use super::resolver;
use super::rules::RuleSet;

/// Compiled, immutable view of one policy file.
/// Built once per load, then shared via Arc.
#[derive(Debug)]
pub struct PolicySnapshot {
    pub rules: RuleSet,
    pub rate_limits: Vec<RateLimitPolicy>,
    pub shell_tools: Vec<String>,
    pub audit_scope: AuditScope,
}

impl PolicySnapshot {
    pub fn compile(cfg: &PolicyConfig) -> Result<Self> {
        Ok(Self {
            rules: RuleSet::load(&cfg.rules)?,
            rate_limits: compile_policies(&cfg.rate_limits)?,
            shell_tools: cfg.shell_tools.clone(),
            audit_scope: cfg.audit.record,
        })
    }
}

/// Everything one evaluation produced, for callers that want more than the decision.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    pub matches: matcher::MatchResult,
    pub rate: Vec<RateOutcome>,
}

/// Decision pipeline: matcher → rate limiter → resolver, with audit on the side.
pub struct PolicyEngine {
    snapshot: RwLock<Arc<PolicySnapshot>>,
    limiter: RateLimiter,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<EngineMetrics>,
}

impl PolicyEngine {
    pub fn new(
        snapshot: PolicySnapshot,
        limiter: RateLimiter,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            limiter,
            audit,
            metrics,
        }
    }

    /// Current snapshot. Callers keep using it even if a reload lands meanwhile.
    pub fn snapshot(&self) -> Result<Arc<PolicySnapshot>> {
        self.snapshot
            .read()
            .map(|s| Arc::clone(&s))
            .map_err(|_| HookGuardError::Internal("policy snapshot lock poisoned".into()))
    }

    /// Compile `cfg` fully, then swap it in. On error the old snapshot stays.
    pub fn reload(&self, cfg: &PolicyConfig) -> Result<()> {
        let next = match PolicySnapshot::compile(cfg) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                self.metrics.reloads.inc(&[("result", "error")]);
                return Err(e);
            }
        };
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| HookGuardError::Internal("policy snapshot lock poisoned".into()))?;
        *guard = next;
        drop(guard);
        self.metrics.reloads.inc(&[("result", "ok")]);
        tracing::info!(rules = cfg.rules.len(), rate_limits = cfg.rate_limits.len(), "policy reloaded");
        Ok(())
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Decode-level entry point: ignores non-`PreToolUse` events, builds the
    /// invocation, evaluates and audits it.
    pub fn handle(&self, input: &HookInput, now: DateTime<Utc>) -> Result<Decision> {
        if !input.is_pre_tool_use() {
            tracing::debug!(event = ?input.hook_event_name, tool = %input.tool_name, "not a pre-tool event; approving");
            return Ok(Decision::approve());
        }
        let snapshot = self.snapshot()?;
        let inv = input.to_invocation(&snapshot.shell_tools)?;
        let eval = self.evaluate_with(&snapshot, &inv, now);
        self.audit(&snapshot, &inv, &eval, input.session_id.clone(), now);
        Ok(eval.decision)
    }

    /// Evaluate against the current snapshot and audit the outcome.
    pub fn decide(&self, inv: &Invocation, now: DateTime<Utc>) -> Result<Decision> {
        let snapshot = self.snapshot()?;
        let eval = self.evaluate_with(&snapshot, inv, now);
        self.audit(&snapshot, inv, &eval, None, now);
        Ok(eval.decision)
    }

    /// Pure pipeline against a given snapshot, without auditing.
    ///
    /// Rate limits are consulted only when no block rule matched, so calls
    /// that are refused anyway do not burn quota.
    pub fn evaluate_with(&self, snapshot: &PolicySnapshot, inv: &Invocation, now: DateTime<Utc>) -> Evaluation {
        let matches = matcher::evaluate(&snapshot.rules, inv);
        let rate = if matches.is_blocked() {
            Vec::new()
        } else {
            self.limiter.evaluate(&snapshot.rate_limits, inv, now)
        };
        let decision = resolver::resolve(inv.kind(), &matches, &rate);

        self.metrics.decisions.inc(&[("action", decision.action.as_str())]);
        for o in rate.iter().filter(|o| o.is_rejection()) {
            match o {
                RateOutcome::StoreFailed { .. } => {
                    self.metrics.rate_limit_store_errors.inc(&[("policy", o.policy())])
                }
                _ => self.metrics.rate_limit_rejections.inc(&[("policy", o.policy())]),
            }
        }
        tracing::debug!(
            kind = inv.kind().as_str(),
            identifier = %inv.identifier(),
            action = decision.action.as_str(),
            blocks = matches.blocks.len(),
            suggestions = matches.suggestions.len(),
            "invocation evaluated"
        );

        Evaluation { decision, matches, rate }
    }

    fn audit(
        &self,
        snapshot: &PolicySnapshot,
        inv: &Invocation,
        eval: &Evaluation,
        session_id: Option<String>,
        now: DateTime<Utc>,
    ) {
        let flagged = !eval.matches.is_empty() || eval.rate.iter().any(RateOutcome::is_rejection);
        if snapshot.audit_scope == AuditScope::Matched && !flagged {
            return;
        }
        let notes = eval.matches.logs.iter().map(|m| m.message.clone()).collect();
        let entry = AuditRecord::new(inv, &eval.decision, now)
            .with_notes(notes)
            .with_session(session_id);
        if let Err(e) = self.audit.record(&entry) {
            self.metrics.audit_write_failures.inc(&[]);
            tracing::error!(error = %e, identifier = %inv.identifier(), "audit record dropped");
        }
    }
}
