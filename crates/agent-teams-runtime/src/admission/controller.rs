//! Admission controller (§4.3): a FIFO orchestration queue plus shared
//! request/LLM capacity counters, with a candidate-ladder reduction when a
//! caller's requested parallelism does not fit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::RuntimeConfig;
use crate::constants::now_ms;

/// Which counter bucket a reservation draws from (§4.3's
/// `activeTeamRuns`/`activeTeammates` vs `activeSubagentRequests`/`activeSubagentAgents`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    TeamRun,
    Subagent,
}

#[derive(Debug, Default)]
struct Counters {
    active_team_runs: u32,
    active_teammates: u32,
    active_subagent_requests: u32,
    active_subagent_agents: u32,
}

impl Counters {
    fn total_requests(&self) -> u32 {
        self.active_team_runs + self.active_subagent_requests
    }

    fn total_llm(&self) -> u32 {
        self.active_teammates + self.active_subagent_agents
    }
}

/// Held by the orchestration that acquired a turn; releasing the queue slot
/// happens automatically on drop.
pub struct OrchestrationLease {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Outcome of `acquire_orchestration_turn`.
pub enum AcquireOutcome {
    Admitted(OrchestrationLease),
    TimedOut,
    Cancelled,
}

/// A held slice of the shared request/LLM budget. Revocable by calling
/// [`AdmissionController::release`] before (or after) the work it backs
/// actually runs — there is no separate "consume" step, matching a caller
/// that decided not to proceed after all.
#[derive(Debug, Clone)]
pub struct CapacityReservation {
    pub id: String,
    kind: CapacityKind,
    requests: u32,
    llm: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ReserveAttempt {
    pub allowed: bool,
    pub projected_requests: u32,
    pub projected_llm: u32,
}

/// Result of `try_reserve_capacity`: the projection plus the reservation
/// handle when allowed.
pub struct ReserveResult {
    pub attempt: ReserveAttempt,
    pub reservation: Option<CapacityReservation>,
}

pub enum ReserveOutcome {
    Reserved(CapacityReservation),
    TimedOut,
    Aborted,
}

/// Result of `resolve_parallel_capacity`: the applied parallelism after
/// walking the candidate ladder (§4.3), which may be smaller than requested.
pub struct ParallelCapacityResult {
    pub allowed: bool,
    pub applied_team_parallelism: usize,
    pub applied_member_parallelism: usize,
    pub reduced: bool,
    pub reservation: Option<CapacityReservation>,
    pub waited_ms: u64,
    pub timed_out: bool,
    pub aborted: bool,
}

/// Builds the descending ladder of `(teamParallelism, memberParallelism)`
/// candidates, stepping both dimensions down in lockstep and floor-clamped
/// at 1, de-duplicating consecutive repeats.
fn candidate_ladder(requested_team_p: usize, requested_member_p: usize) -> Vec<(usize, usize)> {
    let steps = requested_team_p.max(requested_member_p).max(1);
    let mut ladder = Vec::new();
    for i in 0..steps {
        let tp = requested_team_p.saturating_sub(i).max(1);
        let mp = requested_member_p.saturating_sub(i).max(1);
        if ladder.last() != Some(&(tp, mp)) {
            ladder.push((tp, mp));
        }
    }
    ladder
}

/// Shared across every concurrent orchestration in the process (§4.3).
pub struct AdmissionController {
    orchestration_semaphore: Arc<Semaphore>,
    counters: Mutex<Counters>,
    capacity_changed: Notify,
    heartbeats: Mutex<HashMap<String, u64>>,
    max_total_active_requests: u32,
    max_total_active_llm: u32,
}

impl AdmissionController {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            orchestration_semaphore: Arc::new(Semaphore::new(config.max_concurrent_orchestrations)),
            counters: Mutex::new(Counters::default()),
            capacity_changed: Notify::new(),
            heartbeats: Mutex::new(HashMap::new()),
            max_total_active_requests: config.max_total_active_requests,
            max_total_active_llm: config.max_total_active_llm,
        }
    }

    /// `acquireOrchestrationTurn` (§4.3): FIFO admission into the
    /// orchestration queue, relying on `tokio::sync::Semaphore`'s
    /// wake-in-arrival-order guarantee for fairness.
    pub async fn acquire_orchestration_turn(
        &self,
        max_wait_ms: u64,
        cancel: &CancelToken,
    ) -> AcquireOutcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => AcquireOutcome::Cancelled,
            permit = self.orchestration_semaphore.clone().acquire_owned() => {
                match permit {
                    Ok(p) => AcquireOutcome::Admitted(OrchestrationLease { _permit: p }),
                    Err(_) => AcquireOutcome::TimedOut,
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(max_wait_ms)) => AcquireOutcome::TimedOut,
        }
    }

    /// `tryReserveCapacity` (§4.3): a single non-blocking attempt.
    pub fn try_reserve_capacity(
        &self,
        kind: CapacityKind,
        add_requests: u32,
        add_llm: u32,
    ) -> ReserveResult {
        let mut counters = self.counters.lock().unwrap();
        let projected_requests = counters.total_requests() + add_requests;
        let projected_llm = counters.total_llm() + add_llm;
        let allowed = projected_requests <= self.max_total_active_requests
            && projected_llm <= self.max_total_active_llm;

        let attempt = ReserveAttempt {
            allowed,
            projected_requests,
            projected_llm,
        };

        if !allowed {
            return ReserveResult {
                attempt,
                reservation: None,
            };
        }

        match kind {
            CapacityKind::TeamRun => {
                counters.active_team_runs += add_requests;
                counters.active_teammates += add_llm;
            }
            CapacityKind::Subagent => {
                counters.active_subagent_requests += add_requests;
                counters.active_subagent_agents += add_llm;
            }
        }

        ReserveResult {
            attempt,
            reservation: Some(CapacityReservation {
                id: Uuid::new_v4().to_string(),
                kind,
                requests: add_requests,
                llm: add_llm,
            }),
        }
    }

    /// `reserveCapacity` (§4.3): polls at `poll_interval_ms`, waking early on
    /// a capacity-changed notification rather than busy-waiting.
    pub async fn reserve_capacity(
        &self,
        kind: CapacityKind,
        add_requests: u32,
        add_llm: u32,
        max_wait_ms: u64,
        poll_interval_ms: u64,
        cancel: &CancelToken,
    ) -> ReserveOutcome {
        let deadline = now_ms() + max_wait_ms;
        loop {
            if cancel.is_cancelled() {
                return ReserveOutcome::Aborted;
            }
            let result = self.try_reserve_capacity(kind, add_requests, add_llm);
            if let Some(reservation) = result.reservation {
                return ReserveOutcome::Reserved(reservation);
            }
            if now_ms() >= deadline {
                return ReserveOutcome::TimedOut;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(poll_interval_ms)) => {},
                _ = self.capacity_changed.notified() => {},
                _ = cancel.cancelled() => return ReserveOutcome::Aborted,
            }
        }
    }

    /// `resolveParallelCapacity` (§4.3): tries the candidate ladder
    /// immediately (descending order), then blocks on the smallest rung if
    /// nothing fit. `applied <= requested` always holds.
    pub async fn resolve_parallel_capacity(
        &self,
        kind: CapacityKind,
        requested_team_p: usize,
        requested_member_p: usize,
        max_wait_ms: u64,
        poll_interval_ms: u64,
        cancel: &CancelToken,
    ) -> ParallelCapacityResult {
        let ladder = candidate_ladder(requested_team_p, requested_member_p);

        for &(tp, mp) in &ladder {
            let result = self.try_reserve_capacity(kind, tp as u32, (tp * mp) as u32);
            if let Some(reservation) = result.reservation {
                return ParallelCapacityResult {
                    allowed: true,
                    applied_team_parallelism: tp,
                    applied_member_parallelism: mp,
                    reduced: tp < requested_team_p || mp < requested_member_p,
                    reservation: Some(reservation),
                    waited_ms: 0,
                    timed_out: false,
                    aborted: false,
                };
            }
        }

        let &(tp, mp) = ladder.last().expect("candidate ladder always has at least one rung");
        let start = now_ms();
        let outcome = self
            .reserve_capacity(kind, tp as u32, (tp * mp) as u32, max_wait_ms, poll_interval_ms, cancel)
            .await;
        let waited_ms = now_ms().saturating_sub(start);

        match outcome {
            ReserveOutcome::Reserved(reservation) => ParallelCapacityResult {
                allowed: true,
                applied_team_parallelism: tp,
                applied_member_parallelism: mp,
                reduced: true,
                reservation: Some(reservation),
                waited_ms,
                timed_out: false,
                aborted: false,
            },
            ReserveOutcome::TimedOut => ParallelCapacityResult {
                allowed: false,
                applied_team_parallelism: 0,
                applied_member_parallelism: 0,
                reduced: true,
                reservation: None,
                waited_ms,
                timed_out: true,
                aborted: false,
            },
            ReserveOutcome::Aborted => ParallelCapacityResult {
                allowed: false,
                applied_team_parallelism: 0,
                applied_member_parallelism: 0,
                reduced: true,
                reservation: None,
                waited_ms,
                timed_out: false,
                aborted: true,
            },
        }
    }

    /// Releases a reservation's slice of the shared budget and wakes any
    /// `reserve_capacity` pollers.
    pub fn release(&self, reservation: CapacityReservation) {
        let mut counters = self.counters.lock().unwrap();
        match reservation.kind {
            CapacityKind::TeamRun => {
                counters.active_team_runs = counters.active_team_runs.saturating_sub(reservation.requests);
                counters.active_teammates = counters.active_teammates.saturating_sub(reservation.llm);
            }
            CapacityKind::Subagent => {
                counters.active_subagent_requests =
                    counters.active_subagent_requests.saturating_sub(reservation.requests);
                counters.active_subagent_agents =
                    counters.active_subagent_agents.saturating_sub(reservation.llm);
            }
        }
        drop(counters);
        self.heartbeats.lock().unwrap().remove(&reservation.id);
        self.capacity_changed.notify_waiters();
    }

    /// `heartbeat` (§4.3): refreshes a reservation's liveness stamp.
    pub fn heartbeat(&self, reservation: &CapacityReservation) {
        self.heartbeats
            .lock()
            .unwrap()
            .insert(reservation.id.clone(), now_ms());
    }
}
