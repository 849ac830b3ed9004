//! Outcome classification (§4.9) and the per-team/per-run aggregation table
//! (§4.2).

use regex::Regex;
use std::sync::OnceLock;

use crate::error::OutcomeCode;

fn transient_phrase_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)rate limit|too many requests|econnreset|etimedout|connection reset|socket hang up")
            .expect("static transient-phrase regex")
    })
}

fn timeout_phrase_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\btimeout\b|\btimed out\b").expect("static timeout-phrase regex"))
}

/// A classification signal extracted from an error/status before mapping to
/// an outcome. Named distinctly from `OutcomeCode` because several signals
/// (rate_limit, capacity, server_error) all collapse to the same outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureClass {
    RateLimit,
    Capacity,
    ServerError,
}

/// Extracts an HTTP-like status code from an error message, if present, by
/// matching a small vocabulary of codes and phrases (§4.4 step 4). Network
/// phrases map to 503 per spec.
pub fn extract_status_code(message: &str) -> Option<u16> {
    if let Some(code) = Regex::new(r"\b(4\d{2}|5\d{2})\b")
        .expect("static status-code regex")
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
    {
        return Some(code);
    }
    if transient_phrase_regex().is_match(message) {
        return Some(503);
    }
    None
}

/// Whether a status code should be treated as retryable by the default policy.
pub fn is_retryable_status(code: u16) -> bool {
    code == 429 || (500..600).contains(&code)
}

/// Classifies a failure (cancelled/timeout/error message/status) into the
/// outcome code surfaced to callers (§4.9).
pub fn classify_outcome(
    cancelled: bool,
    timed_out: bool,
    status_code: Option<u16>,
    message: &str,
    empty_or_low_substance: bool,
) -> OutcomeCode {
    if cancelled {
        return OutcomeCode::Cancelled;
    }
    if timed_out || timeout_phrase_regex().is_match(message) {
        return OutcomeCode::Timeout;
    }
    if let Some(code) = status_code {
        if is_retryable_status(code) {
            return OutcomeCode::RetryableFailure;
        }
    }
    if transient_phrase_regex().is_match(message) {
        return OutcomeCode::RetryableFailure;
    }
    if empty_or_low_substance {
        return OutcomeCode::RetryableFailure;
    }
    OutcomeCode::NonretryableFailure
}

/// Per-team (or per-member-result) completion tally used for aggregation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionTally {
    pub completed: usize,
    pub failed_retryable: usize,
    pub failed_nonretryable: usize,
}

impl CompletionTally {
    pub fn total(&self) -> usize {
        self.completed + self.failed_retryable + self.failed_nonretryable
    }

    pub fn any_failed(&self) -> bool {
        self.failed_retryable + self.failed_nonretryable > 0
    }

    pub fn any_retryable_failure(&self) -> bool {
        self.failed_retryable > 0
    }
}

/// Aggregates a completion tally into an outcome + retry recommendation,
/// per §4.2's table (also reused for per-team outcome within a single run).
pub fn aggregate_outcome(tally: CompletionTally) -> (OutcomeCode, bool) {
    if tally.total() == 0 {
        return (OutcomeCode::NonretryableFailure, false);
    }
    if !tally.any_failed() {
        return (OutcomeCode::Success, false);
    }
    if tally.completed > 0 {
        return (OutcomeCode::PartialSuccess, tally.any_retryable_failure());
    }
    if tally.any_retryable_failure() {
        return (OutcomeCode::RetryableFailure, true);
    }
    (OutcomeCode::NonretryableFailure, false)
}
