//! Policy layer (rules, matching, decision precedence).
//!
//! Compiles policy configuration into an immutable snapshot and runs the
//! matcher → rate limiter → resolver pipeline against it.

pub mod engine;
pub mod matcher;
pub mod resolver;
pub mod rules;

pub use engine::{Evaluation, PolicyEngine, PolicySnapshot};
pub use matcher::{MatchResult, RuleMatch};
pub use rules::{Rule, RuleSet};
