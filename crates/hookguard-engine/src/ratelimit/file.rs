//! Counter store persisted to a JSON file, for hook mode where every
//! request runs in a fresh process.
//!
//! Cross-process exclusion uses a sibling `.lock` file created with
//! `create_new` and stamped with a per-acquisition token. A lock older than
//! `stale_lock` is treated as abandoned by a crashed writer: it is renamed
//! aside under a unique name before removal, so only one breaker wins, and a
//! holder only deletes the lock on release if it still carries its token.
//! In-process callers are additionally
//! serialized by a mutex. The state file is replaced via write-then-rename so
//! readers never see a torn document. Every I/O or parse failure is reported
//! as `RateLimitStore`, which the limiter turns into a rejection.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration as StdDuration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use hookguard_core::error::{HookGuardError, Result};

use super::{seconds, CounterStore, RateCounter, RateDecision};

const STATE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterFile {
    v: u32,
    #[serde(default)]
    counters: BTreeMap<String, RateCounter>,
}

#[derive(Debug)]
pub struct FileCounterStore {
    path: PathBuf,
    lock_path: PathBuf,
    stale_lock: StdDuration,
    lock_timeout: StdDuration,
    retention: Duration,
    max_keys: usize,
    guard: Mutex<()>,
}

impl FileCounterStore {
    pub fn new(path: impl Into<PathBuf>, retention_seconds: u64, max_keys: usize, stale_lock_ms: u64) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            stale_lock: StdDuration::from_millis(stale_lock_ms),
            lock_timeout: StdDuration::from_millis(stale_lock_ms.saturating_mul(2)),
            retention: seconds(retention_seconds),
            max_keys: max_keys.max(1),
            guard: Mutex::new(()),
        }
    }

    /// How long to wait for a live lock before failing. Default: twice `stale_lock_ms`.
    pub fn with_lock_timeout(mut self, timeout: StdDuration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<CounterFile> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(CounterFile {
                    v: STATE_VERSION,
                    counters: BTreeMap::new(),
                })
            }
            Err(e) => return Err(store_err("read state", &self.path, e)),
        };
        let state: CounterFile = serde_json::from_slice(&bytes).map_err(|e| {
            HookGuardError::RateLimitStore(format!("corrupt state {}: {e}", self.path.display()))
        })?;
        if state.v != STATE_VERSION {
            return Err(HookGuardError::RateLimitStore(format!(
                "unsupported state version {} in {}",
                state.v,
                self.path.display()
            )));
        }
        Ok(state)
    }

    fn write(&self, state: &CounterFile) -> Result<()> {
        let body = serde_json::to_vec(state)
            .map_err(|e| HookGuardError::RateLimitStore(format!("encode state: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| store_err("write state", &tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| store_err("replace state", &self.path, e))
    }

    fn sweep(&self, state: &mut CounterFile, now: DateTime<Utc>) {
        state.counters.retain(|_, c| !c.is_stale(now, self.retention));
        if state.counters.len() > self.max_keys {
            tracing::warn!(live = state.counters.len(), max_keys = self.max_keys, "rate counter file over max_keys with no stale entries");
        }
    }
}

impl CounterStore for FileCounterStore {
    fn check_and_consume(
        &self,
        key: &str,
        max_calls: u32,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<RateDecision> {
        let _local = self
            .guard
            .lock()
            .map_err(|_| HookGuardError::RateLimitStore("store mutex poisoned".into()))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| store_err("create state dir", dir, e))?;
        }
        let _lock = LockFile::acquire(&self.lock_path, self.stale_lock, self.lock_timeout)?;

        let mut state = self.read()?;
        let decision = state
            .counters
            .entry(key.to_string())
            .or_insert_with(|| RateCounter::new(key, now, window_seconds))
            .try_consume(max_calls, window_seconds, now);
        self.sweep(&mut state, now);
        self.write(&state)?;
        Ok(decision)
    }

    fn len(&self) -> Result<usize> {
        let _local = self
            .guard
            .lock()
            .map_err(|_| HookGuardError::RateLimitStore("store mutex poisoned".into()))?;
        Ok(self.read()?.counters.len())
    }
}

/// Exclusive lock file, removed on drop if it still carries our token.
struct LockFile {
    path: PathBuf,
    token: String,
}

static LOCK_SEQ: AtomicU64 = AtomicU64::new(0);

fn lock_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = LOCK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{nanos}-{seq}", std::process::id())
}

impl LockFile {
    fn acquire(path: &Path, stale: StdDuration, timeout: StdDuration) -> Result<Self> {
        let token = lock_token();
        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut f) => {
                    if let Err(e) = f.write_all(token.as_bytes()) {
                        let _ = fs::remove_file(path);
                        return Err(store_err("write lock", path, e));
                    }
                    return Ok(Self {
                        path: path.to_path_buf(),
                        token,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_age(path).is_some_and(|age| age >= stale) && break_stale(path, stale, &token) {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(HookGuardError::RateLimitStore(format!(
                            "timed out waiting for {}",
                            path.display()
                        )));
                    }
                    std::thread::sleep(StdDuration::from_millis(5));
                }
                Err(e) => return Err(store_err("create lock", path, e)),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(owner) if owner == self.token => {
                if let Err(e) = fs::remove_file(&self.path) {
                    tracing::warn!(lock = %self.path.display(), error = %e, "failed to release rate limit lock");
                }
            }
            Ok(_) => {
                tracing::warn!(lock = %self.path.display(), "rate limit lock was broken while held; leaving it to its new owner");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(lock = %self.path.display(), "rate limit lock vanished while held");
            }
            Err(e) => {
                tracing::warn!(lock = %self.path.display(), error = %e, "failed to read rate limit lock on release");
            }
        }
    }
}

/// Move an abandoned lock aside under a unique name so that concurrent
/// breakers cannot both remove it. Returns true when acquisition should be
/// retried immediately.
fn break_stale(path: &Path, stale: StdDuration, token: &str) -> bool {
    let aside = path.with_extension(format!("stale-{token}"));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        // Another breaker got there first.
        Err(e) if e.kind() == ErrorKind::NotFound => return true,
        Err(e) => {
            tracing::warn!(lock = %path.display(), error = %e, "could not move stale rate limit lock aside");
            return false;
        }
    }
    if lock_age(&aside).is_some_and(|age| age >= stale) {
        tracing::warn!(lock = %path.display(), "broke stale rate limit lock");
        let _ = fs::remove_file(&aside);
        return true;
    }
    // Lost a race and moved a live lock: put it back unless a new one already exists.
    if fs::hard_link(&aside, path).is_err() {
        tracing::warn!(lock = %path.display(), "could not restore a live rate limit lock");
    }
    let _ = fs::remove_file(&aside);
    false
}

fn lock_age(path: &Path) -> Option<StdDuration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

fn store_err(what: &str, path: &Path, e: std::io::Error) -> HookGuardError {
    HookGuardError::RateLimitStore(format!("{what} {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn counts_persist_across_store_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("ratelimit.json");

        for i in 0..3 {
            let store = FileCounterStore::new(&path, 3600, 100, 5000);
            assert!(store.check_and_consume("openai", 3, 60, t(i)).unwrap().allowed);
        }
        let store = FileCounterStore::new(&path, 3600, 100, 5000);
        assert!(!store.check_and_consume("openai", 3, 60, t(10)).unwrap().allowed);
        assert!(store.check_and_consume("openai", 3, 60, t(60)).unwrap().allowed);
        assert!(!dir.path().join("state").join("ratelimit.json.lock").exists());
    }

    #[test]
    fn corrupt_state_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratelimit.json");
        fs::write(&path, b"{not json").unwrap();
        let store = FileCounterStore::new(&path, 3600, 100, 5000);
        let err = store.check_and_consume("k", 1, 60, t(0)).unwrap_err();
        assert_eq!(err.code().as_str(), "RATE_LIMIT_STORE");
    }

    fn backdate(path: &Path, by: StdDuration) {
        let f = OpenOptions::new().write(true).open(path).unwrap();
        f.set_modified(SystemTime::now() - by).unwrap();
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn abandoned_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratelimit.json");
        let lock = dir.path().join("ratelimit.json.lock");
        fs::write(&lock, b"crashed-writer").unwrap();
        backdate(&lock, StdDuration::from_secs(10));

        let store = FileCounterStore::new(&path, 3600, 100, 200);
        assert!(store.check_and_consume("k", 1, 60, t(0)).unwrap().allowed);
        assert_eq!(entries(dir.path()), vec!["ratelimit.json".to_string()]);
    }

    #[test]
    fn live_foreign_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratelimit.json");
        let lock = dir.path().join("ratelimit.json.lock");
        fs::write(&lock, b"other-writer").unwrap();

        let store = FileCounterStore::new(&path, 3600, 100, 60_000)
            .with_lock_timeout(StdDuration::from_millis(100));
        let err = store.check_and_consume("k", 1, 60, t(0)).unwrap_err();
        assert_eq!(err.code().as_str(), "RATE_LIMIT_STORE");
        assert_eq!(fs::read_to_string(&lock).unwrap(), "other-writer");
        assert!(!path.exists());
    }

    #[test]
    fn release_leaves_a_successors_lock_alone() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("ratelimit.json.lock");
        let held = LockFile::acquire(&lock, StdDuration::from_secs(5), StdDuration::from_secs(1)).unwrap();
        // Our lock was broken and someone else now holds the path.
        fs::write(&lock, b"successor").unwrap();
        drop(held);
        assert_eq!(fs::read_to_string(&lock).unwrap(), "successor");
    }

    #[test]
    fn release_removes_own_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("ratelimit.json.lock");
        let held = LockFile::acquire(&lock, StdDuration::from_secs(5), StdDuration::from_secs(1)).unwrap();
        assert!(lock.exists());
        drop(held);
        assert!(!lock.exists());
    }

    #[test]
    fn live_lock_moved_aside_by_mistake_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("ratelimit.json.lock");
        fs::write(&lock, b"owner").unwrap();

        assert!(!break_stale(&lock, StdDuration::from_secs(5), "late-breaker"));
        assert_eq!(fs::read_to_string(&lock).unwrap(), "owner");
        assert_eq!(entries(dir.path()), vec!["ratelimit.json.lock".to_string()]);
    }

    #[test]
    fn stale_counters_are_dropped_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratelimit.json");
        let store = FileCounterStore::new(&path, 10, 100, 5000);
        store.check_and_consume("old", 5, 5, t(0)).unwrap();
        store.check_and_consume("new", 5, 5, t(100)).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }
}
