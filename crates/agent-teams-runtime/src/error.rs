//! Crate-wide error taxonomy (§7) and the outcome codes surfaced to callers (§4.9/§6).
//!
//! Every boundary component defines its own narrow error type and implements
//! `From<Self> for RuntimeError` so call sites compose errors with `?` rather
//! than re-deriving the mapping at every call site.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome codes surfaced to callers, paired with whether a retry is recommended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeCode {
    Success,
    PartialSuccess,
    RetryableFailure,
    NonretryableFailure,
    Timeout,
    Cancelled,
}

impl OutcomeCode {
    /// Whether the caller should be told a retry is worth attempting.
    pub fn retry_recommended(&self) -> bool {
        matches!(
            self,
            OutcomeCode::RetryableFailure | OutcomeCode::Timeout | OutcomeCode::PartialSuccess
        )
    }
}

/// Top-level error taxonomy for the orchestration runtime (§7).
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("orchestration queue timed out after {waited_ms}ms")]
    QueueTimeout { waited_ms: u64 },

    #[error("orchestration wait was cancelled")]
    Cancelled,

    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),

    #[error("rate-limit fast-fail: wait of {wait_ms}ms exceeds budget {budget_ms}ms")]
    RateLimitFastFail { wait_ms: u64, budget_ms: u64 },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("non-retryable failure: {0}")]
    NonRetryable(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl RuntimeError {
    /// Maps a taxonomy kind to the outcome code surfaced to the caller (§4.9).
    pub fn outcome_code(&self) -> OutcomeCode {
        match self {
            RuntimeError::Validation(_) => OutcomeCode::NonretryableFailure,
            RuntimeError::QueueTimeout { .. } => OutcomeCode::Timeout,
            RuntimeError::Cancelled => OutcomeCode::Cancelled,
            RuntimeError::CapacityExhausted(_) => OutcomeCode::RetryableFailure,
            RuntimeError::RateLimitFastFail { .. } => OutcomeCode::RetryableFailure,
            RuntimeError::Transient(_) => OutcomeCode::RetryableFailure,
            RuntimeError::Timeout(_) => OutcomeCode::Timeout,
            RuntimeError::NonRetryable(_) => OutcomeCode::NonretryableFailure,
            RuntimeError::Persistence(_) => OutcomeCode::NonretryableFailure,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
