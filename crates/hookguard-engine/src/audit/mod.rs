//! Audit trail for ruled-on invocations.
//!
//! Records are append-only. A failed append is reported to the caller as
//! `AuditWrite`; the engine logs it and leaves the decision untouched.

pub mod jsonl;

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hookguard_core::error::{HookGuardError, Result};
use hookguard_core::{Action, Decision, Invocation, InvocationKind, Payload};

pub use jsonl::JsonlAuditSink;

pub const RECORD_VERSION: u32 = 1;

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub v: u32,
    pub timestamp: DateTime<Utc>,
    pub kind: InvocationKind,
    pub tool: String,
    pub identifier: String,
    pub payload: Payload,
    pub verdict: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Messages of matched log-only rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AuditRecord {
    pub fn new(inv: &Invocation, decision: &Decision, timestamp: DateTime<Utc>) -> Self {
        Self {
            v: RECORD_VERSION,
            timestamp,
            kind: inv.kind(),
            tool: inv.tool_name().to_string(),
            identifier: inv.identifier().to_string(),
            payload: inv.payload().clone(),
            verdict: decision.action,
            reason: decision.reason.clone(),
            notes: Vec::new(),
            session_id: None,
        }
    }

    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}

/// Durable destination for audit records. Appends from concurrent callers
/// must land whole.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditRecord) -> Result<()>;
}

/// Discards everything (audit disabled).
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: &AuditRecord) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory; used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditRecord> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditRecord) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| HookGuardError::AuditWrite("lock poisoned".into()))?
            .push(entry.clone());
        Ok(())
    }
}
