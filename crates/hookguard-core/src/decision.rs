//! Final verdict handed back to the host.

use serde::{Deserialize, Serialize};

/// Resolved action for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Approve,
    Block,
    /// Approve with advisory text attached.
    Suggest,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Block => "block",
            Action::Suggest => "suggest",
        }
    }
}

/// Exactly one is produced per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub reason: Option<String>,
}

impl Decision {
    /// Plain approval; the host receives no output.
    pub fn approve() -> Self {
        Self {
            action: Action::Approve,
            reason: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Block,
            reason: Some(reason.into()),
        }
    }

    pub fn suggest(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Suggest,
            reason: Some(reason.into()),
        }
    }

    pub fn is_block(&self) -> bool {
        self.action == Action::Block
    }

    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}
