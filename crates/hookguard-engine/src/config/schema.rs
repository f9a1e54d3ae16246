use serde::Deserialize;
use hookguard_core::error::{HookGuardError, Result};
use hookguard_core::InvocationKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub version: u32,

    /// Directory name under the config base (`<base>/<namespace>/...`).
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Tool names whose `command` input is inspected as a shell command.
    #[serde(default = "default_shell_tools")]
    pub shell_tools: Vec<String>,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    #[serde(default)]
    pub rate_limits: Vec<RateLimitConfig>,

    #[serde(default)]
    pub rate_limit_store: StoreSection,

    #[serde(default)]
    pub audit: AuditSection,
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(HookGuardError::UnsupportedVersion);
        }
        if self.namespace.is_empty() || self.namespace.contains(['/', '\\']) {
            return Err(HookGuardError::Config(
                "namespace must be a non-empty single path segment".into(),
            ));
        }
        if self.shell_tools.iter().any(|t| t.is_empty()) {
            return Err(HookGuardError::Config("shell_tools entries must not be empty".into()));
        }

        for (i, r) in self.rules.iter().enumerate() {
            if r.message.is_empty() {
                return Err(HookGuardError::Config(format!("rules[{i}].message must not be empty")));
            }
        }

        let mut names = std::collections::HashSet::new();
        for (i, p) in self.rate_limits.iter().enumerate() {
            p.validate().map_err(|e| HookGuardError::Config(format!("rate_limits[{i}]: {e}")))?;
            if !names.insert(p.name.as_str()) {
                return Err(HookGuardError::Config(format!(
                    "rate_limits[{i}].name is duplicated: {}",
                    p.name
                )));
            }
        }

        self.rate_limit_store.validate()?;
        self.audit.validate()?;

        Ok(())
    }
}

fn default_namespace() -> String {
    "hookguard".into()
}
fn default_shell_tools() -> Vec<String> {
    vec!["bash".into()]
}

/// Which invocations a rule or rate-limit policy inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Command,
    ToolCall,
}

impl From<RuleKind> for InvocationKind {
    fn from(k: RuleKind) -> Self {
        match k {
            RuleKind::Command => InvocationKind::Command,
            RuleKind::ToolCall => InvocationKind::ToolCall,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Block,
    Suggest,
    /// Matches are noted in the audit record only.
    Log,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub kind: RuleKind,
    pub pattern: String,
    pub verdict: Verdict,
    /// May reference `{identifier}` and `{tool}`.
    pub message: String,
    /// Default: true for command rules, false for tool_call rules.
    #[serde(default)]
    pub case_insensitive: Option<bool>,
    /// Default: false for command rules (search), true for tool_call rules (match at start).
    #[serde(default)]
    pub anchored: Option<bool>,
}

/// How a rate-limit counter key is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
    /// One counter shared by every matching identifier.
    #[default]
    Policy,
    /// One counter per matching identifier.
    Identifier,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    pub name: String,
    #[serde(default = "default_rate_kind")]
    pub kind: RuleKind,
    pub key_pattern: String,
    pub max_calls: u32,
    pub window_seconds: u64,
    #[serde(default)]
    pub per: KeyScope,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl RateLimitConfig {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() || self.name.contains(':') {
            return Err("name must be non-empty and must not contain ':'".into());
        }
        if self.max_calls == 0 {
            return Err("max_calls must be at least 1".into());
        }
        if !(1..=86_400 * 31).contains(&self.window_seconds) {
            return Err("window_seconds must be between 1 and 2678400".into());
        }
        Ok(())
    }
}

fn default_rate_kind() -> RuleKind {
    RuleKind::ToolCall
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-lifetime counters (serve mode).
    Memory,
    /// JSON state file shared by short-lived hook processes.
    #[default]
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Default: `<base>/<namespace>/state/ratelimit.json`.
    #[serde(default)]
    pub path: Option<String>,

    /// Counters idle this long past their window are evicted.
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,

    #[serde(default = "default_max_keys")]
    pub max_keys: usize,

    /// Run an eviction sweep every N operations.
    #[serde(default = "default_sweep_every")]
    pub sweep_every: u64,

    /// A lock file older than this is considered abandoned.
    #[serde(default = "default_stale_lock_ms")]
    pub stale_lock_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            retention_seconds: default_retention_seconds(),
            max_keys: default_max_keys(),
            sweep_every: default_sweep_every(),
            stale_lock_ms: default_stale_lock_ms(),
        }
    }
}

impl StoreSection {
    pub fn validate(&self) -> Result<()> {
        if self.max_keys == 0 {
            return Err(HookGuardError::Config(
                "rate_limit_store.max_keys must be at least 1".into(),
            ));
        }
        if self.sweep_every == 0 {
            return Err(HookGuardError::Config(
                "rate_limit_store.sweep_every must be at least 1".into(),
            ));
        }
        if !(100..=60_000).contains(&self.stale_lock_ms) {
            return Err(HookGuardError::Config(
                "rate_limit_store.stale_lock_ms must be between 100 and 60000".into(),
            ));
        }
        Ok(())
    }
}

fn default_retention_seconds() -> u64 {
    3600
}
fn default_max_keys() -> usize {
    10_000
}
fn default_sweep_every() -> u64 {
    256
}
fn default_stale_lock_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditScope {
    /// Every ruled-on invocation.
    #[default]
    All,
    /// Only invocations that matched a rule or hit a rate limit.
    Matched,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditSection {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,

    /// Overrides `<base>/<namespace>/logs`.
    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default = "default_log_name")]
    pub log_name: String,

    #[serde(default)]
    pub record: AuditScope,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            dir: None,
            log_name: default_log_name(),
            record: AuditScope::default(),
        }
    }
}

impl AuditSection {
    pub fn validate(&self) -> Result<()> {
        if self.log_name.is_empty() || self.log_name.contains(['/', '\\']) {
            return Err(HookGuardError::Config(
                "audit.log_name must be a non-empty file stem".into(),
            ));
        }
        Ok(())
    }
}

fn default_audit_enabled() -> bool {
    true
}
fn default_log_name() -> String {
    "tool-usage".into()
}
