//! Multi-agent team orchestration runtime.
//!
//! Dispatches a task across one or more teams of independent members,
//! lets members exchange context over communication rounds, selectively
//! retries failed members, and aggregates a final judge verdict over the
//! result set. Admission into the runtime is governed by a shared
//! request/LLM capacity budget, a per-key rate-limit gate, and an adaptive
//! parallelism penalty that responds to recent failure pressure.
//!
//! The [`MemberExecutor`] trait is the only boundary to an actual LLM
//! backend; this crate ships a scripted test double (under `#[cfg(test)]`)
//! and leaves a concrete HTTP-backed implementation to the companion binary
//! crate.

#![allow(clippy::uninlined_format_args)]

pub mod admission;
pub mod cancel;
pub mod config;
pub mod constants;
pub mod error;
pub mod judge;
pub mod member_executor;
pub mod model;
pub mod normalize;
pub mod observer;
pub mod orchestrator;
pub mod outcome;
pub mod penalty;
pub mod rate_limit;
pub mod retry;
pub mod runtime;
pub mod storage;

pub use admission::{
    AcquireOutcome, AdmissionController, CapacityKind, CapacityReservation, OrchestrationLease,
    ParallelCapacityResult, ReserveAttempt, ReserveOutcome, ReserveResult,
};
pub use cancel::CancelToken;
pub use config::RuntimeConfig;
pub use error::{OutcomeCode, RuntimeError, RuntimeResult};
pub use judge::{compute_uncertainty_proxy, fallback_judge, judge, UncertaintyProxy};
pub use member_executor::{MemberExecutor, MemberRequest, MemberResponse};
pub use model::{
    CommunicationAuditEntry, Diagnostics, EnabledState, FinalJudge, Member, MemberResult,
    MemberStatus, PartnerSnapshot, RunStatus, Strategy, TeamDefinition, TeamRunRecord, Verdict,
};
pub use observer::{NullObserver, ObserverSet, Phase, RunObserver};
pub use orchestrator::{
    run_team, run_teams_parallel, synthesize_failed_outcome, team_outcome_code,
    ParallelRunResult, ParallelTeamSpec, RunTeamOutcome, RunTeamRequest, TeamRuntimeDeps,
};
pub use outcome::{aggregate_outcome, classify_outcome, extract_status_code, CompletionTally, PressureClass};
pub use penalty::{AdaptivePenalty, PenaltyReason};
pub use rate_limit::{FileBackedGate, GateSnapshot, GateState, InMemoryGate, RateLimitEntry, SharedGate};
pub use retry::{default_should_retry, execute_with_retry, Jitter, RetryOptions};
pub use runtime::Runtime;
pub use storage::{Pattern, PatternStore, RunArtifact, RunStore, StorageDocument};
