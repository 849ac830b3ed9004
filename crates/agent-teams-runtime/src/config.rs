//! Plain-data runtime configuration (§6, §9 "global singletons" redesign note).
//!
//! The configuration *loader* (env/file parsing, validation UX) is out of
//! scope for this core — callers assemble a [`RuntimeConfig`] however they
//! like (the companion binary crate does it with `clap` + env vars). This
//! module only defines the knobs and the two canonical presets the spec
//! names: the stable profile and a permissive profile for integration tests
//! that need non-zero communication/retry rounds.

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// All configuration knobs named in §6, grouped by the component that reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Forces deterministic, small limits when true (`STABLE_RUNTIME_PROFILE`).
    pub stable_profile: bool,

    // --- Orchestrator / communication ---
    pub max_communication_rounds: u32,
    pub default_communication_rounds: u32,
    pub max_communication_partners: usize,
    pub max_failed_member_retry_rounds: u32,
    pub default_failed_member_retry_rounds: u32,
    pub default_agent_timeout_ms: u64,

    /// Explicit opt-in for a caller-requested `communicationRounds` to survive
    /// stable profile's normal force-to-zero behavior. See DESIGN.md open
    /// question: "should explicit caller communicationRounds override
    /// stable-profile zero".
    pub allow_caller_override_of_stable_zero: bool,

    // --- Admission controller ---
    pub max_parallel_teams_per_run: usize,
    pub max_parallel_teammates_per_team: usize,
    pub max_total_active_requests: u32,
    pub max_total_active_llm: u32,
    pub max_concurrent_orchestrations: usize,
    pub capacity_wait_ms: u64,
    pub capacity_poll_ms: u64,

    // --- Adaptive penalty ---
    pub max_penalty: u32,
    pub decay_ms: u64,
}

impl RuntimeConfig {
    /// `STABLE_RUNTIME_PROFILE=true` (the default): deterministic, small
    /// limits, communication/retry rounds forced to zero, adaptive penalty
    /// disabled (`MAX_PENALTY=0`).
    pub fn stable_profile() -> Self {
        Self {
            stable_profile: true,
            max_communication_rounds: MAX_COMMUNICATION_ROUNDS,
            default_communication_rounds: 0,
            max_communication_partners: MAX_COMMUNICATION_PARTNERS,
            max_failed_member_retry_rounds: MAX_FAILED_MEMBER_RETRY_ROUNDS,
            default_failed_member_retry_rounds: 0,
            default_agent_timeout_ms: DEFAULT_AGENT_TIMEOUT_MS,
            allow_caller_override_of_stable_zero: false,
            max_parallel_teams_per_run: 1,
            max_parallel_teammates_per_team: 1,
            max_total_active_requests: 1,
            max_total_active_llm: 1,
            max_concurrent_orchestrations: 1,
            capacity_wait_ms: 10_000,
            capacity_poll_ms: 200,
            max_penalty: 0,
            decay_ms: 60_000,
        }
    }

    /// A permissive profile used by integration tests that exercise
    /// communication rounds, retry rounds, and non-trivial parallelism.
    pub fn permissive() -> Self {
        Self {
            stable_profile: false,
            max_communication_rounds: MAX_COMMUNICATION_ROUNDS,
            default_communication_rounds: DEFAULT_COMMUNICATION_ROUNDS,
            max_communication_partners: MAX_COMMUNICATION_PARTNERS,
            max_failed_member_retry_rounds: MAX_FAILED_MEMBER_RETRY_ROUNDS,
            default_failed_member_retry_rounds: DEFAULT_FAILED_MEMBER_RETRY_ROUNDS,
            default_agent_timeout_ms: DEFAULT_AGENT_TIMEOUT_MS,
            allow_caller_override_of_stable_zero: true,
            max_parallel_teams_per_run: 4,
            max_parallel_teammates_per_team: 8,
            max_total_active_requests: 16,
            max_total_active_llm: 16,
            max_concurrent_orchestrations: 4,
            capacity_wait_ms: 10_000,
            capacity_poll_ms: 50,
            max_penalty: 4,
            decay_ms: 30_000,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::stable_profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_profile_forces_zero_rounds() {
        let cfg = RuntimeConfig::stable_profile();
        assert_eq!(cfg.default_communication_rounds, 0);
        assert_eq!(cfg.default_failed_member_retry_rounds, 0);
        assert_eq!(cfg.max_penalty, 0);
    }

    #[test]
    fn permissive_profile_allows_rounds() {
        let cfg = RuntimeConfig::permissive();
        assert!(cfg.default_communication_rounds > 0);
        assert!(cfg.max_penalty > 0);
    }
}
