//! Hook mode: decode stdin, decide, translate to exit status and output.
//!
//! This is the single place where `HookGuardError` becomes an exit status.

use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};

use hookguard_core::error::{HookGuardError, HookStatus};
use hookguard_core::protocol::{HookInput, HookReply};

use crate::app_state::AppState;

/// Decide one request body.
pub fn handle(state: &AppState, body: &[u8], now: DateTime<Utc>) -> HookReply {
    let outcome = HookInput::decode(body).and_then(|input| state.engine().handle(&input, now));
    match outcome.and_then(|d| HookReply::from_decision(&d)) {
        Ok(reply) => reply,
        Err(e) => {
            if matches!(e, HookGuardError::Decode(_)) {
                state.engine().metrics().decode_errors.inc(&[]);
            }
            tracing::error!(error = %e, code = e.code().as_str(), "hook request failed");
            HookReply::from_error(&e)
        }
    }
}

/// Like `handle`, but a panic anywhere in evaluation becomes a hook error.
pub fn handle_guarded(state: &AppState, body: &[u8], now: DateTime<Utc>) -> HookReply {
    panic::catch_unwind(AssertUnwindSafe(|| handle(state, body, now))).unwrap_or_else(|_| {
        tracing::error!("panic during evaluation");
        HookReply::from_error(&HookGuardError::Internal("panic during evaluation".into()))
    })
}

pub fn read_request(mut input: impl Read) -> Result<Vec<u8>, HookGuardError> {
    let mut body = Vec::new();
    input
        .read_to_end(&mut body)
        .map_err(|e| HookGuardError::Decode(format!("read stdin: {e}")))?;
    Ok(body)
}

/// Write the reply and return the exit status to use.
pub fn emit(reply: &HookReply, mut stdout: impl Write, mut stderr: impl Write) -> HookStatus {
    if let Some(out) = &reply.stdout {
        if writeln!(stdout, "{out}").and_then(|_| stdout.flush()).is_err() {
            return HookStatus::HookError;
        }
    }
    if let Some(err) = &reply.stderr {
        let _ = writeln!(stderr, "{err}");
    }
    reply.status
}
