//! Newline-delimited JSON audit log.
//!
//! The file is opened lazily in append mode (parents created) on the first
//! record, so an unwritable log directory surfaces as `AuditWrite` on the
//! request path instead of failing startup. Each record is encoded fully and
//! written with a single `write_all` while holding the mutex; with
//! `O_APPEND` this keeps lines from separate processes intact as well.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use hookguard_core::error::{HookGuardError, Result};

use super::{AuditRecord, AuditSink};

#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                HookGuardError::AuditWrite(format!("create {}: {e}", dir.display()))
            })?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HookGuardError::AuditWrite(format!("open {}: {e}", self.path.display())))
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, entry: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_vec(entry)
            .map_err(|e| HookGuardError::AuditWrite(format!("encode record: {e}")))?;
        line.push(b'\n');

        let mut guard = self
            .file
            .lock()
            .map_err(|_| HookGuardError::AuditWrite("lock poisoned".into()))?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        let Some(file) = guard.as_mut() else {
            return Err(HookGuardError::AuditWrite("log file unavailable".into()));
        };

        if let Err(e) = file.write_all(&line).and_then(|_| file.flush()) {
            // Reopen on the next record in case the file was rotated away.
            *guard = None;
            return Err(HookGuardError::AuditWrite(format!(
                "append {}: {e}",
                self.path.display()
            )));
        }
        Ok(())
    }
}
