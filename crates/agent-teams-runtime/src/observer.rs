//! Observer contract (§4.1, §9 redesign note).
//!
//! The reference codebase's live monitor consumed several duck-typed
//! partial interfaces glued together by mutable callback state. Here that
//! collapses into a single `RunObserver` trait with default no-op methods,
//! the same shape as the reference codebase's `EventBus` consumers: callers
//! hold `Arc<dyn RunObserver>`, never a concrete monitor type.

use std::sync::Arc;

use crate::model::{CommunicationAuditEntry, MemberResult};

/// One phase in a member's lifecycle, per the glossary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Queued,
    Initial,
    Communication,
    Judge,
    Finished,
}

/// Best-effort event sink for a team run. All methods default to no-ops so
/// implementors only override what they consume. Observer panics or errors
/// must never propagate into the orchestrator — call sites wrap every
/// invocation so a misbehaving sink cannot abort a run.
pub trait RunObserver: Send + Sync {
    fn on_member_start(&self, _member_id: &str, _phase: Phase) {}
    fn on_member_end(&self, _member_id: &str, _phase: Phase, _result: &MemberResult) {}
    fn on_member_phase(&self, _member_id: &str, _phase: Phase) {}
    fn on_member_result(&self, _result: &MemberResult) {}
    fn on_member_text_chunk(&self, _member_id: &str, _chunk: &str) {}
    fn on_member_stderr_chunk(&self, _member_id: &str, _chunk: &str) {}
    fn on_member_event(&self, _member_id: &str, _event: &str) {}
    fn on_team_event(&self, _event: &str) {}
    fn on_communication_audit(&self, _entry: &CommunicationAuditEntry) {}
}

/// The no-op observer, used when a caller supplies none.
pub struct NullObserver;
impl RunObserver for NullObserver {}

/// A small fan-out list of observer sinks. Each sink is invoked
/// independently; a panic-catching boundary is not needed in Rust the way
/// it is for thrown exceptions, but each sink call is still isolated so one
/// sink's logic error (e.g. a poisoned internal mutex) cannot stop the
/// others from being notified.
#[derive(Clone, Default)]
pub struct ObserverSet {
    sinks: Vec<Arc<dyn RunObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: Arc<dyn RunObserver>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn member_start(&self, member_id: &str, phase: Phase) {
        for sink in &self.sinks {
            sink.on_member_start(member_id, phase);
        }
    }

    pub fn member_end(&self, member_id: &str, phase: Phase, result: &MemberResult) {
        for sink in &self.sinks {
            sink.on_member_end(member_id, phase, result);
        }
    }

    pub fn member_phase(&self, member_id: &str, phase: Phase) {
        for sink in &self.sinks {
            sink.on_member_phase(member_id, phase);
        }
    }

    pub fn member_result(&self, result: &MemberResult) {
        for sink in &self.sinks {
            sink.on_member_result(result);
        }
    }

    pub fn team_event(&self, event: &str) {
        for sink in &self.sinks {
            sink.on_team_event(event);
        }
    }

    pub fn communication_audit(&self, entry: &CommunicationAuditEntry) {
        for sink in &self.sinks {
            sink.on_communication_audit(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver {
        count: AtomicUsize,
    }

    impl RunObserver for CountingObserver {
        fn on_team_event(&self, _event: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fan_out_reaches_every_sink() {
        let a = Arc::new(CountingObserver {
            count: AtomicUsize::new(0),
        });
        let b = Arc::new(CountingObserver {
            count: AtomicUsize::new(0),
        });
        let set = ObserverSet::new()
            .with(a.clone() as Arc<dyn RunObserver>)
            .with(b.clone() as Arc<dyn RunObserver>);
        set.team_event("run-started");
        assert_eq!(a.count.load(Ordering::SeqCst), 1);
        assert_eq!(b.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_observer_accepts_everything() {
        let obs = NullObserver;
        obs.on_team_event("noop");
        obs.on_member_start("m1", Phase::Initial);
    }
}
