//! Policy config loader (strict parsing).
//!
//! Lookup order: explicit path (`--config` / `HOOKGUARD_CONFIG`), then
//! `<base>/hookguard/policy.yaml` or `policy.yml`, then the embedded default
//! policy. `<base>` is `$XDG_CONFIG_HOME`, falling back to `~/.config`.

pub mod schema;
pub mod substitute;

use std::fs;
use std::path::{Path, PathBuf};

use hookguard_core::error::{HookGuardError, Result};

pub use schema::{
    AuditScope, AuditSection, KeyScope, PolicyConfig, RateLimitConfig, RuleConfig, RuleKind,
    StoreBackend, StoreSection, Verdict,
};

/// Embedded fallback policy.
pub const DEFAULT_POLICY: &str = include_str!("default_policy.yaml");

const DEFAULT_NAMESPACE_DIR: &str = "hookguard";

pub fn load_from_file(path: &Path) -> Result<PolicyConfig> {
    let s = fs::read_to_string(path).map_err(|e| {
        HookGuardError::Config(format!("read policy {} failed: {e}", path.display()))
    })?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<PolicyConfig> {
    let s = substitute::substitute_env_vars(s)?;
    let cfg: PolicyConfig = serde_yaml::from_str(&s)
        .map_err(|e| HookGuardError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_default() -> Result<PolicyConfig> {
    load_from_str(DEFAULT_POLICY)
}

/// Where a loaded policy came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    File(PathBuf),
    Builtin,
}

impl std::fmt::Display for PolicySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicySource::File(p) => write!(f, "{}", p.display()),
            PolicySource::Builtin => f.write_str("<builtin>"),
        }
    }
}

/// Find the policy to use. An explicit path must exist.
pub fn resolve(explicit: Option<&Path>, base: &Path) -> Result<PolicySource> {
    if let Some(p) = explicit {
        if !p.is_file() {
            return Err(HookGuardError::Config(format!(
                "policy file not found: {}",
                p.display()
            )));
        }
        return Ok(PolicySource::File(p.to_path_buf()));
    }
    for name in ["policy.yaml", "policy.yml"] {
        let candidate = base.join(DEFAULT_NAMESPACE_DIR).join(name);
        if candidate.is_file() {
            return Ok(PolicySource::File(candidate));
        }
    }
    Ok(PolicySource::Builtin)
}

pub fn load(source: &PolicySource) -> Result<PolicyConfig> {
    match source {
        PolicySource::File(p) => load_from_file(p),
        PolicySource::Builtin => load_default(),
    }
}

/// `$XDG_CONFIG_HOME`, else `~/.config`, else the current directory.
pub fn config_base_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".config"),
        None => PathBuf::from("."),
    }
}

/// `<base>/<namespace>/logs/<log_name>.jsonl` unless `audit.dir` overrides the directory.
pub fn audit_log_path(cfg: &PolicyConfig, base: &Path) -> PathBuf {
    let dir = match &cfg.audit.dir {
        Some(d) => PathBuf::from(d),
        None => base.join(&cfg.namespace).join("logs"),
    };
    dir.join(format!("{}.jsonl", cfg.audit.log_name))
}

/// `<base>/<namespace>/state/ratelimit.json` unless configured.
pub fn counter_state_path(cfg: &PolicyConfig, base: &Path) -> PathBuf {
    match &cfg.rate_limit_store.path {
        Some(p) => PathBuf::from(p),
        None => base.join(&cfg.namespace).join("state").join("ratelimit.json"),
    }
}
