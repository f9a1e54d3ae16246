//! Shared application state for hookguard.
//!
//! Wires the policy snapshot, counter store, audit sink and metrics into one
//! `PolicyEngine`. The store and sink are chosen at startup and survive
//! policy reloads; only rules and rate-limit policies are swapped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hookguard_core::error::Result;

use crate::audit::{AuditSink, JsonlAuditSink, NullAuditSink};
use crate::config::{self, PolicyConfig, PolicySource, StoreBackend};
use crate::obs::metrics::EngineMetrics;
use crate::policy::{PolicyEngine, PolicySnapshot};
use crate::ratelimit::{CounterStore, FileCounterStore, InMemoryCounterStore, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    source: PolicySource,
    base_dir: PathBuf,
    engine: PolicyEngine,
}

impl AppState {
    /// Build application state.
    /// Returns Result so a bad rule set refuses to start instead of panicking.
    pub fn new(cfg: &PolicyConfig, source: PolicySource, base_dir: PathBuf) -> Result<Self> {
        let snapshot = PolicySnapshot::compile(cfg)?;
        let store = build_store(cfg, &base_dir);
        let audit = build_audit(cfg, &base_dir);
        Ok(Self::with_parts(snapshot, source, base_dir, store, audit))
    }

    /// Assemble from explicit parts (tests and embedders).
    pub fn with_parts(
        snapshot: PolicySnapshot,
        source: PolicySource,
        base_dir: PathBuf,
        store: Arc<dyn CounterStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let metrics = Arc::new(EngineMetrics::default());
        let engine = PolicyEngine::new(snapshot, RateLimiter::new(store), audit, metrics);
        Self {
            inner: Arc::new(AppStateInner {
                source,
                base_dir,
                engine,
            }),
        }
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.inner.engine
    }

    pub fn source(&self) -> &PolicySource {
        &self.inner.source
    }

    pub fn base_dir(&self) -> &Path {
        &self.inner.base_dir
    }

    /// Re-read the policy source and swap it in atomically.
    pub fn reload(&self) -> Result<()> {
        let cfg = config::load(&self.inner.source).map_err(|e| {
            self.inner.engine.metrics().reloads.inc(&[("result", "error")]);
            e
        })?;
        self.inner.engine.reload(&cfg)
    }

    /// Extra gauge lines for `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let mut out = Vec::new();
        if let Ok(s) = self.inner.engine.snapshot() {
            out.push(("hookguard_rules_loaded", s.rules.len() as u64));
            out.push(("hookguard_rate_limit_policies_loaded", s.rate_limits.len() as u64));
        }
        if let Ok(n) = self.inner.engine.limiter().store().len() {
            out.push(("hookguard_rate_counters_live", n as u64));
        }
        out
    }
}

fn build_store(cfg: &PolicyConfig, base: &Path) -> Arc<dyn CounterStore> {
    let s = &cfg.rate_limit_store;
    match s.backend {
        StoreBackend::Memory => Arc::new(InMemoryCounterStore::new(
            s.retention_seconds,
            s.max_keys,
            s.sweep_every,
        )),
        StoreBackend::File => {
            let path = config::counter_state_path(cfg, base);
            tracing::debug!(path = %path.display(), "using file rate counter store");
            Arc::new(FileCounterStore::new(
                path,
                s.retention_seconds,
                s.max_keys,
                s.stale_lock_ms,
            ))
        }
    }
}

fn build_audit(cfg: &PolicyConfig, base: &Path) -> Arc<dyn AuditSink> {
    if !cfg.audit.enabled {
        return Arc::new(NullAuditSink);
    }
    let path = config::audit_log_path(cfg, base);
    tracing::debug!(path = %path.display(), "audit log");
    Arc::new(JsonlAuditSink::new(path))
}
