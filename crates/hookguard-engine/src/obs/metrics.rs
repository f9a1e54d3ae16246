//! Labelled counters backed by `DashMap`.
//!
//! Labels are flattened into sorted key vectors to keep rendering
//! deterministic.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

type LabelKey = Vec<(String, String)>;

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let mut key: LabelKey = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        key.sort();
        self.map
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 if never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        let mut key: LabelKey = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        key.sort();
        self.map
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        let mut rows: Vec<(String, u64)> = self
            .map
            .iter()
            .map(|r| {
                let labels = r
                    .key()
                    .iter()
                    .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
                    .collect::<Vec<_>>()
                    .join(",");
                (labels, r.value().load(Ordering::Relaxed))
            })
            .collect();
        rows.sort();
        for (labels, val) in rows {
            if labels.is_empty() {
                let _ = writeln!(out, "{name} {val}");
            } else {
                let _ = writeln!(out, "{name}{{{labels}}} {val}");
            }
        }
    }
}

#[derive(Default)]
pub struct EngineMetrics {
    /// label: action
    pub decisions: CounterVec,
    /// label: policy
    pub rate_limit_rejections: CounterVec,
    /// label: policy
    pub rate_limit_store_errors: CounterVec,
    pub audit_write_failures: CounterVec,
    pub decode_errors: CounterVec,
    /// label: result
    pub reloads: CounterVec,
}

impl EngineMetrics {
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        self.decisions.render("hookguard_decisions_total", &mut out);
        self.rate_limit_rejections
            .render("hookguard_rate_limit_rejections_total", &mut out);
        self.rate_limit_store_errors
            .render("hookguard_rate_limit_store_errors_total", &mut out);
        self.audit_write_failures
            .render("hookguard_audit_write_failures_total", &mut out);
        self.decode_errors.render("hookguard_decode_errors_total", &mut out);
        self.reloads.render("hookguard_policy_reloads_total", &mut out);
        for (k, v) in extra {
            let _ = writeln!(out, "{k} {v}");
        }
        out
    }
}
