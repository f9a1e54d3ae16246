//! Invocation: a single proposed tool/command execution under review.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flattened `tool_input` fields. Non-string values are kept as their JSON text.
pub type Payload = BTreeMap<String, String>;

/// What kind of action is being proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// A shell command; identified by its command text.
    Command,
    /// Any other tool call; identified by the tool name.
    ToolCall,
}

impl InvocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InvocationKind::Command => "command",
            InvocationKind::ToolCall => "tool_call",
        }
    }
}

/// Immutable per-request view handed to the matcher and rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    kind: InvocationKind,
    tool_name: String,
    identifier: String,
    payload: Payload,
}

impl Invocation {
    pub fn new(
        kind: InvocationKind,
        tool_name: impl Into<String>,
        identifier: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            kind,
            tool_name: tool_name.into(),
            identifier: identifier.into(),
            payload,
        }
    }

    /// Shell command invocation issued through `tool_name`.
    pub fn command(tool_name: impl Into<String>, command: impl Into<String>) -> Self {
        let command = command.into();
        let mut payload = Payload::new();
        payload.insert("command".into(), command.clone());
        Self::new(InvocationKind::Command, tool_name, command, payload)
    }

    /// Plain tool call, identified by the tool name.
    pub fn tool_call(tool_name: impl Into<String>, payload: Payload) -> Self {
        let tool_name = tool_name.into();
        Self::new(InvocationKind::ToolCall, tool_name.clone(), tool_name, payload)
    }

    pub fn kind(&self) -> InvocationKind {
        self.kind
    }
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }
    /// Command text for `Command`, tool name for `ToolCall`.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}
