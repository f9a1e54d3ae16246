//! Rule set compilation and lookup.
//!
//! Rules are compiled once from config into regexes and never mutated;
//! a reload builds a whole new `RuleSet`.

use regex::{Regex, RegexBuilder};

use hookguard_core::error::{HookGuardError, Result};
use hookguard_core::{Invocation, InvocationKind};

use crate::config::{RuleConfig, Verdict};

/// Compiled pattern → verdict rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub kind: InvocationKind,
    pub verdict: Verdict,
    message: String,
    pattern: Regex,
}

impl Rule {
    pub fn is_match(&self, identifier: &str) -> bool {
        self.pattern.is_match(identifier)
    }

    /// Message with `{identifier}` and `{tool}` expanded.
    pub fn message_for(&self, inv: &Invocation) -> String {
        self.message
            .replace("{identifier}", inv.identifier())
            .replace("{tool}", inv.tool_name())
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Immutable ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile every rule; the first bad pattern aborts the load.
    pub fn load(raw: &[RuleConfig]) -> Result<Self> {
        let mut rules = Vec::with_capacity(raw.len());
        for (index, r) in raw.iter().enumerate() {
            let name = r.name.clone().unwrap_or_else(|| format!("rule-{index}"));
            let kind = InvocationKind::from(r.kind);
            let command = kind == InvocationKind::Command;

            let pattern = compile_pattern(
                &r.pattern,
                r.case_insensitive.unwrap_or(command),
                r.anchored.unwrap_or(!command),
            )
            .map_err(|reason| HookGuardError::RuleLoad {
                index,
                name: name.clone(),
                reason,
            })?;

            rules.push(Rule {
                name,
                kind,
                verdict: r.verdict,
                message: r.message.clone(),
                pattern,
            });
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every rule of `kind` matching `identifier`, in declaration order.
    pub fn matching<'a>(
        &'a self,
        kind: InvocationKind,
        identifier: &'a str,
    ) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules
            .iter()
            .filter(move |r| r.kind == kind && r.is_match(identifier))
    }
}

/// Compile a user pattern. `anchored` pins the match to the start of the
/// input, the way tool-name patterns are written.
pub(crate) fn compile_pattern(
    pattern: &str,
    case_insensitive: bool,
    anchored: bool,
) -> std::result::Result<Regex, String> {
    let source = if anchored {
        format!("^(?:{pattern})")
    } else {
        pattern.to_string()
    };
    RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleKind;

    fn rule(kind: RuleKind, pattern: &str, verdict: Verdict) -> RuleConfig {
        RuleConfig {
            name: None,
            kind,
            pattern: pattern.into(),
            verdict,
            message: format!("matched {pattern}"),
            case_insensitive: None,
            anchored: None,
        }
    }

    #[test]
    fn bad_pattern_names_rule_index() {
        let raw = vec![
            rule(RuleKind::Command, r"\bls\b", Verdict::Suggest),
            rule(RuleKind::Command, r"(unclosed", Verdict::Block),
        ];
        match RuleSet::load(&raw) {
            Err(HookGuardError::RuleLoad { index, name, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(name, "rule-1");
            }
            other => panic!("expected RuleLoad, got {other:?}"),
        }
    }

    #[test]
    fn command_rules_are_case_insensitive_by_default() {
        let set = RuleSet::load(&[rule(RuleKind::Command, r"\brm\s+-rf\s+/", Verdict::Block)]).unwrap();
        assert_eq!(set.matching(InvocationKind::Command, "RM -RF /").count(), 1);
        assert_eq!(set.matching(InvocationKind::Command, "sudo rm -rf /tmp").count(), 1);
    }

    #[test]
    fn tool_rules_are_case_sensitive_and_anchored_by_default() {
        let set = RuleSet::load(&[rule(RuleKind::ToolCall, "mcp__github__delete_.*", Verdict::Block)]).unwrap();
        assert_eq!(set.matching(InvocationKind::ToolCall, "mcp__github__delete_repo").count(), 1);
        assert_eq!(set.matching(InvocationKind::ToolCall, "MCP__GITHUB__DELETE_REPO").count(), 0);
        assert_eq!(set.matching(InvocationKind::ToolCall, "x_mcp__github__delete_repo").count(), 0);
    }

    #[test]
    fn kind_filters_rules() {
        let set = RuleSet::load(&[rule(RuleKind::ToolCall, "bash", Verdict::Block)]).unwrap();
        assert_eq!(set.matching(InvocationKind::Command, "bash").count(), 0);
    }

    #[test]
    fn explicit_options_override_defaults() {
        let mut r = rule(RuleKind::Command, "grep", Verdict::Suggest);
        r.case_insensitive = Some(false);
        r.anchored = Some(true);
        let set = RuleSet::load(&[r]).unwrap();
        assert_eq!(set.matching(InvocationKind::Command, "grep x").count(), 1);
        assert_eq!(set.matching(InvocationKind::Command, "GREP x").count(), 0);
        assert_eq!(set.matching(InvocationKind::Command, "cat f | grep x").count(), 0);
    }

    #[test]
    fn matches_preserve_declaration_order() {
        let set = RuleSet::load(&[
            rule(RuleKind::Command, "b", Verdict::Suggest),
            rule(RuleKind::Command, "a", Verdict::Suggest),
            rule(RuleKind::Command, "c", Verdict::Suggest),
        ])
        .unwrap();
        let names: Vec<_> = set.matching(InvocationKind::Command, "abc").map(|r| r.pattern()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn message_placeholders_expand() {
        let mut r = rule(RuleKind::ToolCall, "mcp__aws__.*", Verdict::Block);
        r.message = "Tool {identifier} ({tool}) is blocked".into();
        let set = RuleSet::load(&[r]).unwrap();
        let inv = Invocation::tool_call("mcp__aws__drop_production", Default::default());
        let msg = set.rules()[0].message_for(&inv);
        assert_eq!(msg, "Tool mcp__aws__drop_production (mcp__aws__drop_production) is blocked");
    }
}
