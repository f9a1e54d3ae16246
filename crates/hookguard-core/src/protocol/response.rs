//! Hook response encoding.

use serde::Serialize;

use crate::decision::{Action, Decision};
use crate::error::{HookGuardError, HookStatus, Result};

/// JSON object written to stdout (hook mode) or returned as the body (serve mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookOutput {
    /// "approve" or "block".
    pub decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HookOutput {
    pub fn from_decision(d: &Decision) -> Self {
        let decision = match d.action {
            Action::Block => "block",
            Action::Approve | Action::Suggest => "approve",
        };
        Self {
            decision,
            reason: d.reason.clone(),
        }
    }
}

/// Everything the hook process emits for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookReply {
    pub status: HookStatus,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl HookReply {
    /// Translate a decision into process output.
    ///
    /// Block: message on stderr, status 2. Suggest: `HookOutput` on stdout,
    /// status 0. Plain approve: silence, status 0.
    pub fn from_decision(d: &Decision) -> Result<Self> {
        match d.action {
            Action::Block => Ok(Self {
                status: HookStatus::Block,
                stdout: None,
                stderr: Some(d.reason().to_string()),
            }),
            Action::Suggest => {
                let body = serde_json::to_string(&HookOutput::from_decision(d))
                    .map_err(|e| HookGuardError::Internal(format!("encode output: {e}")))?;
                Ok(Self {
                    status: HookStatus::Approve,
                    stdout: Some(body),
                    stderr: None,
                })
            }
            Action::Approve => Ok(Self {
                status: HookStatus::Approve,
                stdout: None,
                stderr: None,
            }),
        }
    }

    /// Translate an engine error into process output.
    pub fn from_error(e: &HookGuardError) -> Self {
        Self {
            status: e.hook_status(),
            stdout: None,
            stderr: Some(format!("Hook error: {e}")),
        }
    }
}
