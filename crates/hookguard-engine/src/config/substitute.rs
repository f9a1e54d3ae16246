//! `${env://VAR}` and `${env://VAR:-default}` expansion for policy files.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use hookguard_core::error::{HookGuardError, Result};

fn env_pattern() -> Result<&'static Regex> {
    static RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{env://([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}"))
        .as_ref()
        .map_err(|e| HookGuardError::Internal(format!("env pattern: {e}")))
}

/// Expand environment references. An unset variable without a default is an error.
pub fn substitute_env_vars(content: &str) -> Result<String> {
    substitute_with(content, |name| std::env::var(name).ok())
}

pub(crate) fn substitute_with<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();
    let out = env_pattern()?.replace_all(content, |caps: &Captures<'_>| {
        let name = &caps[1];
        if let Some(v) = lookup(name).filter(|v| !v.is_empty()) {
            return v;
        }
        match caps.get(3) {
            Some(default) => default.as_str().to_string(),
            None => {
                missing.push(name.to_string());
                caps[0].to_string()
            }
        }
    });

    if !missing.is_empty() {
        return Err(HookGuardError::Config(format!(
            "required environment variable(s) not set: {}",
            missing.join(", ")
        )));
    }
    Ok(out.into_owned())
}
