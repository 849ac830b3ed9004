//! Shared constants, id formatting, and small timeout/limit defaults used
//! across every boundary component.

use rand::Rng;

/// Default cap on partners a member exchanges context with in a communication round.
pub const MAX_COMMUNICATION_PARTNERS: usize = 3;

/// Hard ceiling on configurable communication rounds regardless of caller request.
pub const MAX_COMMUNICATION_ROUNDS: u32 = 4;

/// Default communication rounds when the caller does not specify one.
pub const DEFAULT_COMMUNICATION_ROUNDS: u32 = 1;

/// Hard ceiling on configurable failed-member retry rounds.
pub const MAX_FAILED_MEMBER_RETRY_ROUNDS: u32 = 3;

/// Default failed-member retry rounds when the caller does not specify one.
pub const DEFAULT_FAILED_MEMBER_RETRY_ROUNDS: u32 = 1;

/// Per-field truncation limit when assembling communication context (§4.1 phase 3).
pub const COMMUNICATION_CONTEXT_FIELD_LIMIT: usize = 280;

/// Aggregate truncation limit for the "other" portion of communication context.
pub const COMMUNICATION_CONTEXT_OTHER_LIMIT: usize = 800;

/// Preview length cap for `CommunicationAuditEntry.contextPreview`.
pub const CONTEXT_PREVIEW_LIMIT: usize = 200;

/// Default per-member dispatch timeout.
pub const DEFAULT_AGENT_TIMEOUT_MS: u64 = 60_000;

/// Maximum persisted run records retained in team storage.
pub const MAX_RUNS_TO_KEEP: usize = 200;

/// Rate-limit gate: hit counter ceiling.
pub const MAX_RATE_LIMIT_HITS: u32 = 8;

/// Rate-limit gate: minimum backoff applied on a hit.
pub const MIN_RATE_LIMIT_DELAY_MS: u64 = 800;

/// Rate-limit gate: maximum backoff applied on a hit.
pub const MAX_RATE_LIMIT_DELAY_MS: u64 = 120_000;

/// Rate-limit gate: success clamp window.
pub const RATE_LIMIT_SUCCESS_CLAMP_MS: u64 = 800;

/// Rate-limit gate: entry staleness window before eviction is considered.
pub const RATE_LIMIT_STALE_MS: u64 = 600_000;

/// Rate-limit gate: map capacity before oldest-by-updatedAt eviction kicks in.
pub const RATE_LIMIT_MAP_CAPACITY: usize = 64;

/// The key that participates in every rate-limit lookup alongside the request key.
pub const GLOBAL_RATE_LIMIT_KEY: &str = "__global__";

/// Rate-limit gate: debounce window for persisted writes.
pub const RATE_LIMIT_WRITE_DEBOUNCE_MS: u64 = 500;

/// Current epoch milliseconds, used throughout for timestamps and TTL math.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generates a collision-resistant run id of the form `t_<epoch_ms>_<hex4>`.
pub fn generate_run_id() -> String {
    let ts = now_ms();
    let suffix: u16 = rand::thread_rng().gen();
    format!("t_{ts}_{suffix:04x}")
}
