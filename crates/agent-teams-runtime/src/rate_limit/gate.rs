//! Pure rate-limit gate math (§4.5), shared by every `SharedGate` implementation.
//!
//! Kept free of I/O so the mutation/merge/prune rules can be unit tested
//! without touching the filesystem, and so `FileBackedGate` and
//! `InMemoryGate` cannot drift from each other's semantics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// One key's rate-limit state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RateLimitEntry {
    pub until_ms: u64,
    pub hits: u32,
    pub updated_at_ms: u64,
}

/// What a caller needs to decide whether to wait or fast-fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateSnapshot {
    pub wait_ms: u64,
    pub hits: u32,
    pub until_ms: u64,
}

/// The full key → entry map, held either purely in memory or mirrored to disk.
#[derive(Debug, Clone, Default)]
pub struct GateState {
    pub entries: HashMap<String, RateLimitEntry>,
}

impl GateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `registerHit` (§4.5): bounded hit counter, adaptive exponential delay.
    pub fn register_hit(&mut self, key: &str, suggested_delay_ms: u64, now: u64) {
        let entry = self.entries.entry(key.to_string()).or_insert(RateLimitEntry {
            until_ms: 0,
            hits: 0,
            updated_at_ms: now,
        });
        entry.hits = (entry.hits + 1).min(MAX_RATE_LIMIT_HITS);
        let base_delay = suggested_delay_ms.max(MIN_RATE_LIMIT_DELAY_MS);
        let adaptive_delay = base_delay
            .saturating_mul(1u64 << (entry.hits.saturating_sub(1)))
            .min(MAX_RATE_LIMIT_DELAY_MS);
        entry.until_ms = entry.until_ms.max(now + adaptive_delay);
        entry.updated_at_ms = now;
    }

    /// `registerSuccess` (§4.5): decays the hit counter, drops the entry at zero.
    pub fn register_success(&mut self, key: &str, now: u64) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        if entry.hits <= 1 {
            self.entries.remove(key);
            return;
        }
        entry.hits -= 1;
        entry.until_ms = entry.until_ms.min(now + RATE_LIMIT_SUCCESS_CLAMP_MS);
        entry.updated_at_ms = now;
    }

    /// `snapshot(key)`: the longer wait of `key` and the global key.
    pub fn snapshot(&self, key: &str, now: u64) -> GateSnapshot {
        let key_entry = self.entries.get(key).copied();
        let global_entry = if key == GLOBAL_RATE_LIMIT_KEY {
            None
        } else {
            self.entries.get(GLOBAL_RATE_LIMIT_KEY).copied()
        };

        let pick = |entry: Option<RateLimitEntry>| -> (u64, u32, u64) {
            match entry {
                Some(e) => (e.until_ms.saturating_sub(now), e.hits, e.until_ms),
                None => (0, 0, 0),
            }
        };

        let (key_wait, key_hits, key_until) = pick(key_entry);
        let (global_wait, global_hits, global_until) = pick(global_entry);

        if global_wait > key_wait {
            GateSnapshot {
                wait_ms: global_wait,
                hits: global_hits,
                until_ms: global_until,
            }
        } else {
            GateSnapshot {
                wait_ms: key_wait,
                hits: key_hits,
                until_ms: key_until,
            }
        }
    }

    /// Pruning (§4.5): drop stale-and-expired entries, then evict
    /// oldest-by-updatedAt if still over capacity.
    pub fn prune(&mut self, now: u64) {
        self.entries.retain(|_, e| {
            let stale = now.saturating_sub(e.updated_at_ms) > RATE_LIMIT_STALE_MS;
            let expired = e.until_ms <= now;
            !(stale && expired)
        });

        if self.entries.len() > RATE_LIMIT_MAP_CAPACITY {
            let mut by_age: Vec<(String, u64)> = self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.updated_at_ms))
                .collect();
            by_age.sort_by_key(|(_, updated_at)| *updated_at);
            let overflow = self.entries.len() - RATE_LIMIT_MAP_CAPACITY;
            for (key, _) in by_age.into_iter().take(overflow) {
                self.entries.remove(&key);
            }
        }
    }

    /// Merge-before-mutate rule for two concurrently-updated states (§9 open
    /// question): pointwise max of `untilMs`, `hits`, `updatedAtMs` per key.
    pub fn merge(&mut self, other: &GateState) {
        for (key, other_entry) in &other.entries {
            let merged = match self.entries.get(key) {
                Some(mine) => RateLimitEntry {
                    until_ms: mine.until_ms.max(other_entry.until_ms),
                    hits: mine.hits.max(other_entry.hits),
                    updated_at_ms: mine.updated_at_ms.max(other_entry.updated_at_ms),
                },
                None => *other_entry,
            };
            self.entries.insert(key.clone(), merged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_hit_is_monotonically_non_decreasing_until_ms() {
        let mut state = GateState::new();
        state.register_hit("k", 1000, 1_000);
        let first_until = state.entries["k"].until_ms;
        state.register_hit("k", 500, 1_500);
        assert!(state.entries["k"].until_ms >= first_until);
    }

    #[test]
    fn register_hit_caps_hits_at_eight() {
        let mut state = GateState::new();
        for i in 0..20 {
            state.register_hit("k", 100, 1000 * i);
        }
        assert_eq!(state.entries["k"].hits, MAX_RATE_LIMIT_HITS);
    }

    #[test]
    fn register_hit_caps_delay_at_max() {
        let mut state = GateState::new();
        for i in 0..8 {
            state.register_hit("k", 100_000, 1000 * i);
        }
        let entry = state.entries["k"];
        assert!(entry.until_ms - entry.updated_at_ms <= MAX_RATE_LIMIT_DELAY_MS);
    }

    #[test]
    fn register_success_drops_entry_at_zero_hits() {
        let mut state = GateState::new();
        state.register_hit("k", 1000, 0);
        state.register_success("k", 1000);
        assert!(!state.entries.contains_key("k"));
    }

    #[test]
    fn register_success_decrements_without_dropping_above_one() {
        let mut state = GateState::new();
        state.register_hit("k", 1000, 0);
        state.register_hit("k", 1000, 0);
        state.register_success("k", 1000);
        assert_eq!(state.entries["k"].hits, 1);
    }

    #[test]
    fn snapshot_takes_longer_of_key_and_global_wait() {
        let mut state = GateState::new();
        state.register_hit("k", 1000, 0);
        state.register_hit(GLOBAL_RATE_LIMIT_KEY, 50_000, 0);
        let snap = state.snapshot("k", 0);
        assert_eq!(snap.wait_ms, state.entries[GLOBAL_RATE_LIMIT_KEY].until_ms);
    }

    #[test]
    fn prune_respects_64_entry_cap() {
        let mut state = GateState::new();
        for i in 0..100 {
            state.register_hit(&format!("k{i}"), 1000, i as u64 * 10);
        }
        state.prune(100_000);
        assert!(state.entries.len() <= RATE_LIMIT_MAP_CAPACITY);
    }

    #[test]
    fn prune_drops_only_stale_and_expired() {
        let mut state = GateState::new();
        state.entries.insert(
            "stale_expired".to_string(),
            RateLimitEntry {
                until_ms: 100,
                hits: 1,
                updated_at_ms: 0,
            },
        );
        state.entries.insert(
            "stale_not_expired".to_string(),
            RateLimitEntry {
                until_ms: 10_000_000,
                hits: 1,
                updated_at_ms: 0,
            },
        );
        state.prune(1_000_000);
        assert!(!state.entries.contains_key("stale_expired"));
        assert!(state.entries.contains_key("stale_not_expired"));
    }

    #[test]
    fn merge_takes_pointwise_max() {
        let mut a = GateState::new();
        a.entries.insert(
            "k".to_string(),
            RateLimitEntry {
                until_ms: 100,
                hits: 1,
                updated_at_ms: 5,
            },
        );
        let mut b = GateState::new();
        b.entries.insert(
            "k".to_string(),
            RateLimitEntry {
                until_ms: 50,
                hits: 3,
                updated_at_ms: 10,
            },
        );
        a.merge(&b);
        let merged = a.entries["k"];
        assert_eq!(merged.until_ms, 100);
        assert_eq!(merged.hits, 3);
        assert_eq!(merged.updated_at_ms, 10);
    }
}
