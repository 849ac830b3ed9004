//! Shared admission control (§4.3): the orchestration queue and the
//! request/LLM capacity budget every orchestration draws from.

mod controller;

pub use controller::{
    AcquireOutcome, AdmissionController, CapacityKind, CapacityReservation, OrchestrationLease,
    ParallelCapacityResult, ReserveAttempt, ReserveOutcome, ReserveResult,
};
