//! Shared error type across hookguard crates.

use thiserror::Error;

/// Stable error codes (used in HTTP bodies and diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A rule or rate-limit pattern failed to compile.
    RuleLoad,
    /// Malformed incoming request.
    Decode,
    /// Audit log append failed.
    AuditWrite,
    /// Rate-limit counter store unreachable or corrupt.
    RateLimitStore,
    /// Invalid policy configuration.
    Config,
    /// Unsupported policy file version.
    UnsupportedVersion,
    /// Internal failure.
    Internal,
}

impl ErrorCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::RuleLoad => "RULE_LOAD",
            ErrorCode::Decode => "DECODE",
            ErrorCode::AuditWrite => "AUDIT_WRITE",
            ErrorCode::RateLimitStore => "RATE_LIMIT_STORE",
            ErrorCode::Config => "CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Process exit status reported to the host in hook mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    /// Proceed (silently or with suggestions on stdout).
    Approve,
    /// The request could not be decoded.
    DecodeError,
    /// Do not execute.
    Block,
    /// The engine itself failed; never to be read as an approval.
    HookError,
}

impl HookStatus {
    pub fn code(self) -> i32 {
        match self {
            HookStatus::Approve => 0,
            HookStatus::DecodeError => 1,
            HookStatus::Block => 2,
            HookStatus::HookError => 3,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, HookGuardError>;

/// Unified error type used by core and engine.
#[derive(Debug, Error)]
pub enum HookGuardError {
    #[error("rule {index} ({name}) failed to load: {reason}")]
    RuleLoad {
        index: usize,
        name: String,
        reason: String,
    },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("audit write failed: {0}")]
    AuditWrite(String),
    #[error("rate limit store error: {0}")]
    RateLimitStore(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("unsupported policy version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl HookGuardError {
    /// Map internal error to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            HookGuardError::RuleLoad { .. } => ErrorCode::RuleLoad,
            HookGuardError::Decode(_) => ErrorCode::Decode,
            HookGuardError::AuditWrite(_) => ErrorCode::AuditWrite,
            HookGuardError::RateLimitStore(_) => ErrorCode::RateLimitStore,
            HookGuardError::Config(_) => ErrorCode::Config,
            HookGuardError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            HookGuardError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Exit status for the hook boundary.
    ///
    /// Only decode failures get their own status; everything else that escapes
    /// evaluation is an engine malfunction.
    pub fn hook_status(&self) -> HookStatus {
        match self {
            HookGuardError::Decode(_) => HookStatus::DecodeError,
            _ => HookStatus::HookError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_statuses_are_distinct() {
        let codes = [
            HookStatus::Approve.code(),
            HookStatus::DecodeError.code(),
            HookStatus::Block.code(),
            HookStatus::HookError.code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(HookStatus::Block.code(), 2);
        assert_eq!(HookStatus::DecodeError.code(), 1);
    }

    #[test]
    fn only_decode_maps_to_decode_status() {
        assert_eq!(
            HookGuardError::Decode("bad".into()).hook_status(),
            HookStatus::DecodeError
        );
        assert_eq!(
            HookGuardError::Internal("boom".into()).hook_status(),
            HookStatus::HookError
        );
        let e = HookGuardError::RuleLoad {
            index: 3,
            name: "x".into(),
            reason: "unclosed group".into(),
        };
        assert_eq!(e.hook_status(), HookStatus::HookError);
        assert!(e.to_string().contains("rule 3"));
    }
}
