//! Decision precedence.
//!
//! 1. rate-limit rejection → Block
//! 2. block rule → Block
//! 3. suggestion → Suggest (approve with advisory text)
//! 4. otherwise → Approve, silently
//!
//! The engine only consults rate limits when no block rule matched, so a
//! call that trips both reports the block rule's message and the exceeded
//! policy is not named (nor charged).

use hookguard_core::{Decision, InvocationKind};

use super::matcher::MatchResult;
use crate::ratelimit::RateOutcome;

pub fn resolve(kind: InvocationKind, matches: &MatchResult, rate: &[RateOutcome]) -> Decision {
    let rate_reasons: Vec<String> = rate.iter().filter_map(rate_reason).collect();
    if !rate_reasons.is_empty() {
        return Decision::block(rate_reasons.join("; "));
    }

    if matches.is_blocked() {
        return Decision::block(join_messages(&matches.blocks));
    }

    if !matches.suggestions.is_empty() {
        let prefix = match kind {
            InvocationKind::Command => "Command approved. Suggestions: ",
            InvocationKind::ToolCall => "Tool call approved. Suggestions: ",
        };
        return Decision::suggest(format!("{prefix}{}", join_messages(&matches.suggestions)));
    }

    Decision::approve()
}

fn rate_reason(o: &RateOutcome) -> Option<String> {
    match o {
        RateOutcome::Allowed { .. } => None,
        RateOutcome::Exceeded {
            policy,
            max_calls,
            window_seconds,
        } => Some(format!(
            "Rate limit exceeded: {max_calls} calls per {window_seconds}s ({policy})"
        )),
        RateOutcome::StoreFailed { policy, .. } => Some(format!(
            "Rate limit store unavailable ({policy}): failing closed"
        )),
    }
}

fn join_messages(ms: &[super::matcher::RuleMatch]) -> String {
    ms.iter()
        .map(|m| m.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
