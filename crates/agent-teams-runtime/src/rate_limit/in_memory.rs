//! In-memory `SharedGate` (§9 redesign note): the default for unit tests,
//! with no filesystem dependency.

use std::sync::Mutex;

use super::gate::{GateSnapshot, GateState};
use super::SharedGate;
use crate::constants::now_ms;

pub struct InMemoryGate {
    state: Mutex<GateState>,
}

impl InMemoryGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::new()),
        }
    }
}

impl Default for InMemoryGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedGate for InMemoryGate {
    fn snapshot(&self, key: &str) -> GateSnapshot {
        let state = self.state.lock().unwrap();
        state.snapshot(key, now_ms())
    }

    fn register_hit(&self, key: &str, suggested_delay_ms: u64) {
        let mut state = self.state.lock().unwrap();
        let now = now_ms();
        state.register_hit(key, suggested_delay_ms, now);
        state.prune(now);
    }

    fn register_success(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        let now = now_ms();
        state.register_success(key, now);
        state.prune(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_then_snapshot_reports_positive_wait() {
        let gate = InMemoryGate::new();
        gate.register_hit("k", 1000);
        let snap = gate.snapshot("k");
        assert!(snap.wait_ms > 0);
        assert_eq!(snap.hits, 1);
    }

    #[test]
    fn success_clears_entry_eventually() {
        let gate = InMemoryGate::new();
        gate.register_hit("k", 1000);
        gate.register_success("k");
        let snap = gate.snapshot("k");
        assert_eq!(snap.hits, 0);
    }
}
