//! File-backed `SharedGate` (§4.5, §5): persists to
//! `~/.pi/runtime/retry-rate-limit-state.json`, cross-process-safe via an
//! `fs2` advisory file lock on a sibling `.lock` file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::gate::{GateSnapshot, GateState, RateLimitEntry};
use super::SharedGate;
use crate::constants::{now_ms, RATE_LIMIT_WRITE_DEBOUNCE_MS};

/// On-disk shape of `~/.pi/runtime/retry-rate-limit-state.json` (§6).
#[derive(Debug, Serialize, Deserialize, Default)]
struct DiskState {
    version: u32,
    updated_at: u64,
    entries: std::collections::HashMap<String, RateLimitEntry>,
}

impl DiskState {
    fn into_gate_state(self) -> GateState {
        GateState {
            entries: self.entries,
        }
    }

    fn from_gate_state(state: &GateState, now: u64) -> Self {
        Self {
            version: 1,
            updated_at: now,
            entries: state.entries.clone(),
        }
    }
}

pub struct FileBackedGate {
    path: PathBuf,
    lock_path: PathBuf,
    cache: Mutex<GateState>,
    last_write_ms: AtomicU64,
    dirty: AtomicBool,
    /// Single in-process re-entry guard (§4.5): mutations on this gate from
    /// within this process never need to wait for the file lock against
    /// themselves.
    in_process_guard: Mutex<()>,
}

impl FileBackedGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        let cache = Self::read_disk(&path).unwrap_or_default();
        Self {
            path,
            lock_path,
            cache: Mutex::new(cache),
            last_write_ms: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
            in_process_guard: Mutex::new(()),
        }
    }

    fn read_disk(path: &Path) -> Option<GateState> {
        let bytes = fs::read(path).ok()?;
        let disk: DiskState = serde_json::from_slice(&bytes).ok()?;
        Some(disk.into_gate_state())
    }

    fn try_lock_file(&self) -> Option<File> {
        if let Some(parent) = self.lock_path.parent() {
            if fs::create_dir_all(parent).is_err() {
                return None;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)
            .ok()?;
        match file.try_lock_exclusive() {
            Ok(()) => Some(file),
            Err(_) => None,
        }
    }

    fn write_atomic(&self, state: &GateState, now: u64) {
        let disk = DiskState::from_gate_state(state, now);
        let Ok(json) = serde_json::to_vec_pretty(&disk) else {
            return;
        };
        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            if fs::create_dir_all(parent).is_err() {
                warn!(path = %self.path.display(), "failed to create rate-limit state directory");
                return;
            }
        }
        let wrote = (|| -> std::io::Result<()> {
            let mut f = File::create(&tmp_path)?;
            f.write_all(&json)?;
            f.sync_all()?;
            fs::rename(&tmp_path, &self.path)?;
            Ok(())
        })();
        if let Err(e) = wrote {
            warn!(error = %e, "best-effort rate-limit state write failed");
        } else {
            self.last_write_ms.store(now, Ordering::SeqCst);
            self.dirty.store(false, Ordering::SeqCst);
        }
    }

    /// Runs `f` over the merged disk+memory state under the cross-process
    /// lock (best-effort: falls back to in-memory-only mutation if the lock
    /// cannot be acquired), then prunes and debounce-writes.
    fn with_lock_and_merge(&self, f: impl FnOnce(&mut GateState, u64)) {
        let _guard = self.in_process_guard.lock().unwrap();
        let now = now_ms();
        let lock_file = self.try_lock_file();
        if lock_file.is_none() {
            warn!("rate-limit file lock unavailable; falling back to in-memory mutation");
        }

        let mut cache = self.cache.lock().unwrap();
        if lock_file.is_some() {
            if let Some(disk_state) = Self::read_disk(&self.path) {
                cache.merge(&disk_state);
            }
        }

        f(&mut cache, now);
        cache.prune(now);
        self.dirty.store(true, Ordering::SeqCst);

        let elapsed = now.saturating_sub(self.last_write_ms.load(Ordering::SeqCst));
        if lock_file.is_some() && elapsed >= RATE_LIMIT_WRITE_DEBOUNCE_MS {
            self.write_atomic(&cache, now);
        }

        if let Some(file) = lock_file {
            let _ = fs2::FileExt::unlock(&file);
        }
    }

    /// Forces a pending debounced write to disk. Intended for process-exit
    /// flush paths (§4.5 "on process beforeExit, a pending write is flushed
    /// synchronously").
    pub fn flush(&self) {
        if !self.dirty.load(Ordering::SeqCst) {
            return;
        }
        let cache = self.cache.lock().unwrap();
        self.write_atomic(&cache, now_ms());
    }
}

impl Drop for FileBackedGate {
    fn drop(&mut self) {
        self.flush();
    }
}

impl SharedGate for FileBackedGate {
    fn snapshot(&self, key: &str) -> GateSnapshot {
        let cache = self.cache.lock().unwrap();
        cache.snapshot(key, now_ms())
    }

    fn register_hit(&self, key: &str, suggested_delay_ms: u64) {
        self.with_lock_and_merge(|state, now| {
            state.register_hit(key, suggested_delay_ms, now);
        });
    }

    fn register_success(&self, key: &str) {
        self.with_lock_and_merge(|state, now| {
            state.register_success(key, now);
        });
    }
}
