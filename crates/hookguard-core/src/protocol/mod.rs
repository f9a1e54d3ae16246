//! Hook wire protocol (JSON in, exit status + JSON/stderr out).
//!
//! - Request: the host's `PreToolUse` payload, decoded once into `HookInput`.
//! - Response: `HookOutput` on stdout for annotated approvals, a stderr
//!   message for blocks, silence for plain approvals.
//!
//! Decoding is panic-free: malformed input is reported as
//! `HookGuardError::Decode` so the host can tell an engine failure apart from
//! a policy block.

pub mod request;
pub mod response;

pub use request::HookInput;
pub use response::{HookOutput, HookReply};
