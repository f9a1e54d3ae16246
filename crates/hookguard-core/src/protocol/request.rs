//! Hook request decoding.
//!
//! `tool_input` is kept as `RawValue` and only parsed once the engine knows it
//! needs it. Hosts send it either as a JSON-encoded string or as an inline
//! object; both are accepted.

use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::error::{HookGuardError, Result};
use crate::invocation::{Invocation, Payload};

/// The only event this engine rules on; other events are approved silently.
pub const PRE_TOOL_USE: &str = "PreToolUse";

/// Host request (stdin in hook mode, body in serve mode).
#[derive(Debug, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    /// Unix timestamp when the hook fired.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub interactive: Option<bool>,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Option<Box<RawValue>>,
}

impl HookInput {
    /// Decode a request body.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| HookGuardError::Decode(format!("invalid hook input: {e}")))
    }

    /// Whether this request asks for a pre-execution ruling.
    pub fn is_pre_tool_use(&self) -> bool {
        match self.hook_event_name.as_deref() {
            None => true,
            Some(ev) => ev == PRE_TOOL_USE,
        }
    }

    /// Parse `tool_input` into a JSON object.
    pub fn tool_input_object(&self) -> Result<Map<String, Value>> {
        let Some(raw) = self.tool_input.as_ref() else {
            return Ok(Map::new());
        };
        let value: Value = serde_json::from_str(raw.get())
            .map_err(|e| HookGuardError::Decode(format!("invalid tool_input: {e}")))?;

        let value = match value {
            Value::String(encoded) if encoded.trim().is_empty() => return Ok(Map::new()),
            Value::String(encoded) => serde_json::from_str(&encoded).map_err(|e| {
                HookGuardError::Decode(format!("invalid encoded tool_input: {e}"))
            })?,
            other => other,
        };

        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(HookGuardError::Decode(format!(
                "tool_input must be an object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Build the invocation. `shell_tools` lists tool names whose `command`
    /// field is the thing to inspect.
    pub fn to_invocation(&self, shell_tools: &[String]) -> Result<Invocation> {
        if self.tool_name.is_empty() {
            return Err(HookGuardError::Decode("tool_name must not be empty".into()));
        }
        let input = self.tool_input_object()?;
        let payload = flatten(&input);

        if shell_tools.iter().any(|t| t == &self.tool_name) {
            let command = payload.get("command").cloned().unwrap_or_default();
            return Ok(Invocation::new(
                crate::invocation::InvocationKind::Command,
                self.tool_name.clone(),
                command,
                payload,
            ));
        }
        Ok(Invocation::tool_call(self.tool_name.clone(), payload))
    }
}

fn flatten(input: &Map<String, Value>) -> Payload {
    input
        .iter()
        .map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), s)
        })
        .collect()
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::invocation::InvocationKind;

    fn shell() -> Vec<String> {
        vec!["bash".to_string()]
    }

    #[test]
    fn encoded_string_tool_input() {
        let body = br#"{"tool_name":"bash","tool_input":"{\"command\":\"ls -la\"}"}"#;
        let input = HookInput::decode(body).unwrap();
        let inv = input.to_invocation(&shell()).unwrap();
        assert_eq!(inv.kind(), InvocationKind::Command);
        assert_eq!(inv.identifier(), "ls -la");
        assert_eq!(inv.tool_name(), "bash");
    }

    #[test]
    fn inline_object_tool_input() {
        let body = br#"{"tool_name":"mcp__fs__read","tool_input":{"path":"/tmp/a","limit":10}}"#;
        let inv = HookInput::decode(body).unwrap().to_invocation(&shell()).unwrap();
        assert_eq!(inv.kind(), InvocationKind::ToolCall);
        assert_eq!(inv.identifier(), "mcp__fs__read");
        assert_eq!(inv.payload().get("path").map(String::as_str), Some("/tmp/a"));
        assert_eq!(inv.payload().get("limit").map(String::as_str), Some("10"));
    }

    #[test]
    fn missing_tool_input_is_empty() {
        let inv = HookInput::decode(br#"{"tool_name":"bash"}"#)
            .unwrap()
            .to_invocation(&shell())
            .unwrap();
        assert_eq!(inv.identifier(), "");
        assert!(inv.payload().is_empty());
    }

    #[test]
    fn malformed_requests_are_decode_errors() {
        assert!(matches!(
            HookInput::decode(b"not json"),
            Err(HookGuardError::Decode(_))
        ));
        assert!(matches!(
            HookInput::decode(br#"{"tool_input":"{}"}"#),
            Err(HookGuardError::Decode(_))
        ));
        let input = HookInput::decode(br#"{"tool_name":"bash","tool_input":"{oops"}"#).unwrap();
        assert!(matches!(
            input.to_invocation(&shell()),
            Err(HookGuardError::Decode(_))
        ));
        let input = HookInput::decode(br#"{"tool_name":"bash","tool_input":[1,2]}"#).unwrap();
        assert!(matches!(
            input.to_invocation(&shell()),
            Err(HookGuardError::Decode(_))
        ));
    }

    #[test]
    fn event_filter() {
        let pre = HookInput::decode(br#"{"tool_name":"x","hook_event_name":"PreToolUse"}"#).unwrap();
        assert!(pre.is_pre_tool_use());
        let post = HookInput::decode(br#"{"tool_name":"x","hook_event_name":"PostToolUse"}"#).unwrap();
        assert!(!post.is_pre_tool_use());
    }
}
