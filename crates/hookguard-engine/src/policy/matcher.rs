//! Rule matching for one invocation.
//!
//! Pure: no I/O, no shared state. The whole rule list is scanned so every
//! block reason and every suggestion is collected.

use hookguard_core::Invocation;

use crate::config::Verdict;

use super::rules::RuleSet;

/// One matched rule with its message already expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule: String,
    pub message: String,
}

/// Matches grouped by verdict, each in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub blocks: Vec<RuleMatch>,
    pub suggestions: Vec<RuleMatch>,
    pub logs: Vec<RuleMatch>,
}

impl MatchResult {
    pub fn is_blocked(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.suggestions.is_empty() && self.logs.is_empty()
    }
}

pub fn evaluate(rules: &RuleSet, inv: &Invocation) -> MatchResult {
    let mut out = MatchResult::default();
    for rule in rules.matching(inv.kind(), inv.identifier()) {
        let m = RuleMatch {
            rule: rule.name.clone(),
            message: rule.message_for(inv),
        };
        match rule.verdict {
            Verdict::Block => out.blocks.push(m),
            Verdict::Suggest => out.suggestions.push(m),
            Verdict::Log => out.logs.push(m),
        }
    }
    out
}
