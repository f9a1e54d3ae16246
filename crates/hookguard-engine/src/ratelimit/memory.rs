//! In-process counter store backed by `DashMap`.
//!
//! `entry()` holds the shard write lock for the key while the counter is
//! checked and bumped, so two callers can never both take the last slot.
//! Eviction is lazy: a sweep drops stale counters every `sweep_every`
//! operations, or immediately when the map grows past `max_keys`. Counters
//! still inside their window are never evicted, so `max_keys` is a sweep
//! trigger rather than a hard cap.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use hookguard_core::error::Result;

use super::{seconds, CounterStore, RateCounter, RateDecision};

#[derive(Debug)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, RateCounter>,
    ops: AtomicU64,
    retention: Duration,
    max_keys: usize,
    sweep_every: u64,
}

impl InMemoryCounterStore {
    pub fn new(retention_seconds: u64, max_keys: usize, sweep_every: u64) -> Self {
        Self {
            counters: DashMap::new(),
            ops: AtomicU64::new(0),
            retention: seconds(retention_seconds),
            max_keys: max_keys.max(1),
            sweep_every: sweep_every.max(1),
        }
    }

    /// Drop every counter whose window ended at least `retention` ago.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, c| !c.is_stale(now, self.retention));
        let removed = before.saturating_sub(self.counters.len());
        if removed > 0 {
            tracing::debug!(removed, live = self.counters.len(), "rate counters swept");
        }
        removed
    }

    fn maybe_sweep(&self, now: DateTime<Utc>) {
        let n = self.ops.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.sweep_every == 0 || self.counters.len() > self.max_keys {
            self.sweep(now);
            if self.counters.len() > self.max_keys {
                tracing::warn!(live = self.counters.len(), max_keys = self.max_keys, "rate counter map over max_keys with no stale entries");
            }
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new(3600, 10_000, 256)
    }
}

impl CounterStore for InMemoryCounterStore {
    fn check_and_consume(
        &self,
        key: &str,
        max_calls: u32,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<RateDecision> {
        let decision = {
            let mut counter = self
                .counters
                .entry(key.to_string())
                .or_insert_with(|| RateCounter::new(key, now, window_seconds));
            counter.try_consume(max_calls, window_seconds, now)
        };
        // Shard guard is released before sweeping; `retain` locks every shard.
        self.maybe_sweep(now);
        Ok(decision)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.counters.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn nth_allowed_then_rejected_then_reset() {
        let store = InMemoryCounterStore::default();
        for i in 0..10 {
            let d = store.check_and_consume("openai", 10, 60, t(i)).unwrap();
            assert!(d.allowed, "call {} should pass", i + 1);
            assert_eq!(d.remaining, 9 - i as u32);
        }
        assert!(!store.check_and_consume("openai", 10, 60, t(30)).unwrap().allowed);
        let d = store.check_and_consume("openai", 10, 60, t(60)).unwrap();
        assert!(d.allowed);
        assert_eq!(d.remaining, 9);
    }

    #[test]
    fn keys_are_independent() {
        let store = InMemoryCounterStore::default();
        assert!(store.check_and_consume("a", 1, 60, t(0)).unwrap().allowed);
        assert!(!store.check_and_consume("a", 1, 60, t(1)).unwrap().allowed);
        assert!(store.check_and_consume("b", 1, 60, t(1)).unwrap().allowed);
    }

    #[test]
    fn periodic_sweep_reclaims_idle_counters() {
        let store = InMemoryCounterStore::new(10, 10_000, 4);
        store.check_and_consume("old-1", 5, 5, t(0)).unwrap();
        store.check_and_consume("old-2", 5, 5, t(0)).unwrap();
        assert_eq!(store.len().unwrap(), 2);

        // 4th op triggers a sweep; old counters ended at t(5), stale from t(15).
        store.check_and_consume("new", 5, 5, t(100)).unwrap();
        store.check_and_consume("new", 5, 5, t(100)).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn over_max_keys_sweeps_but_keeps_live_windows() {
        let store = InMemoryCounterStore::new(0, 2, 1_000_000);
        store.check_and_consume("a", 5, 60, t(0)).unwrap();
        store.check_and_consume("b", 5, 60, t(0)).unwrap();
        store.check_and_consume("c", 5, 60, t(1)).unwrap();
        // All still inside their windows.
        assert_eq!(store.len().unwrap(), 3);
        store.check_and_consume("d", 5, 60, t(61)).unwrap();
        // a, b and c ended at t(60)/t(61); d is live.
        assert_eq!(store.len().unwrap(), 1);
    }
}
