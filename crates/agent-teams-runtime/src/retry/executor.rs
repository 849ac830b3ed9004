//! Retry executor (§4.4): bounded exponential backoff with jitter, wired
//! into the rate-limit gate for 429-aware fast-fail.

use std::future::Future;

use rand::Rng;

use crate::cancel::CancelToken;
use crate::constants::GLOBAL_RATE_LIMIT_KEY;
use crate::error::{RuntimeError, RuntimeResult};
use crate::outcome::{extract_status_code, is_retryable_status};
use crate::rate_limit::SharedGate;

/// Jitter strategy applied to the computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Uniform random delay in `[0, computed]`.
    Full,
    /// Uniform random delay in `[computed/2, computed]`.
    Partial,
    /// No randomization.
    None,
}

/// Per-call overrides for the retry loop. Stable profile callers should
/// leave `max_retries` at its `Default` of 0; non-default values are an
/// explicit opt-in, as the reference semantics require.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: Jitter,
    pub rate_limit_key: Option<String>,
    pub max_rate_limit_retries: u32,
    pub max_rate_limit_wait_ms: u64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: Jitter::Full,
            rate_limit_key: None,
            max_rate_limit_retries: 3,
            max_rate_limit_wait_ms: 60_000,
        }
    }
}

impl RetryOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_rate_limit_key(mut self, key: impl Into<String>) -> Self {
        self.rate_limit_key = Some(key.into());
        self
    }
}

/// The default retry policy (§4.4 step 5): 429, 5xx, and known-transient
/// errors are retryable; everything else is not.
pub fn default_should_retry(err: &RuntimeError, status_code: Option<u16>) -> bool {
    if let Some(code) = status_code {
        if is_retryable_status(code) {
            return true;
        }
    }
    matches!(
        err,
        RuntimeError::Transient(_) | RuntimeError::Timeout(_) | RuntimeError::CapacityExhausted(_)
    )
}

fn compute_backoff(options: &RetryOptions, attempt: u32) -> u64 {
    let exponent = (attempt.saturating_sub(1)) as i32;
    let base = options.initial_delay_ms as f64 * options.multiplier.powi(exponent);
    let capped = base.min(options.max_delay_ms as f64).max(0.0) as u64;
    apply_jitter(capped, options.jitter)
}

fn apply_jitter(delay_ms: u64, jitter: Jitter) -> u64 {
    match jitter {
        Jitter::None => delay_ms,
        Jitter::Full => {
            if delay_ms == 0 {
                0
            } else {
                rand::thread_rng().gen_range(0..=delay_ms)
            }
        }
        Jitter::Partial => {
            let half = delay_ms / 2;
            if delay_ms <= half {
                half
            } else {
                half + rand::thread_rng().gen_range(0..=(delay_ms - half))
            }
        }
    }
}

/// Sleeps for `ms`, returning early with `false` if `cancel` trips first.
async fn sleep_cancellable(ms: u64, cancel: &CancelToken) -> bool {
    if ms == 0 {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_millis(ms)) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Runs `operation` under the bounded-retry loop described in §4.4. The
/// `should_retry`/`on_retry`/`on_rate_limit_wait` hooks mirror the
/// reference contract's `shouldRetry`, `onRetry`, `onRateLimitWait`.
pub async fn execute_with_retry<F, Fut, T>(
    gate: &dyn SharedGate,
    options: &RetryOptions,
    cancel: &CancelToken,
    should_retry: impl Fn(&RuntimeError, Option<u16>) -> bool,
    mut on_retry: impl FnMut(u32, u64, &RuntimeError),
    mut on_rate_limit_wait: impl FnMut(u64),
    mut operation: F,
) -> RuntimeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RuntimeResult<T>>,
{
    let mut attempt: u32 = 0;
    let mut rate_limit_retries: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        if let Some(key) = &options.rate_limit_key {
            let snapshot = gate.snapshot(key);
            if snapshot.wait_ms > 0 {
                if snapshot.wait_ms > options.max_rate_limit_wait_ms {
                    return Err(RuntimeError::RateLimitFastFail {
                        wait_ms: snapshot.wait_ms,
                        budget_ms: options.max_rate_limit_wait_ms,
                    });
                }
                on_rate_limit_wait(snapshot.wait_ms);
                if !sleep_cancellable(snapshot.wait_ms, cancel).await {
                    return Err(RuntimeError::Cancelled);
                }
                continue;
            }
        }

        match operation().await {
            Ok(value) => {
                if let Some(key) = &options.rate_limit_key {
                    gate.register_success(key);
                    gate.register_success(GLOBAL_RATE_LIMIT_KEY);
                }
                return Ok(value);
            }
            Err(err) => {
                let status_code = extract_status_code(&err.to_string());
                let retryable = should_retry(&err, status_code);

                if !retryable || attempt >= options.max_retries {
                    return Err(err);
                }

                if status_code == Some(429) {
                    rate_limit_retries += 1;
                    if rate_limit_retries > options.max_rate_limit_retries {
                        return Err(err);
                    }
                }

                attempt += 1;
                let mut delay = compute_backoff(options, attempt);

                if status_code == Some(429) {
                    if let Some(key) = &options.rate_limit_key {
                        gate.register_hit(key, delay);
                        gate.register_hit(GLOBAL_RATE_LIMIT_KEY, delay);
                        let snapshot = gate.snapshot(key);
                        delay = delay.max(snapshot.wait_ms);
                        if delay > options.max_rate_limit_wait_ms {
                            return Err(RuntimeError::RateLimitFastFail {
                                wait_ms: delay,
                                budget_ms: options.max_rate_limit_wait_ms,
                            });
                        }
                    }
                }

                on_retry(attempt, delay, &err);
                if !sleep_cancellable(delay, cancel).await {
                    return Err(RuntimeError::Cancelled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::InMemoryGate;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn noop_callbacks() -> (impl FnMut(u32, u64, &RuntimeError), impl FnMut(u64)) {
        (|_, _, _: &RuntimeError| {}, |_| {})
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let gate = InMemoryGate::new();
        let cancel = CancelToken::new();
        let calls = AtomicU32::new(0);
        let (on_retry, on_wait) = noop_callbacks();

        let result = execute_with_retry(
            &gate,
            &RetryOptions::default(),
            &cancel,
            default_should_retry,
            on_retry,
            on_wait,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RuntimeError>(42)
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_up_to_max_retries() {
        let gate = InMemoryGate::new();
        let cancel = CancelToken::new();
        let calls = AtomicU32::new(0);
        let options = RetryOptions {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            jitter: Jitter::None,
            ..Default::default()
        };
        let (on_retry, on_wait) = noop_callbacks();

        let result = execute_with_retry(
            &gate,
            &options,
            &cancel,
            default_should_retry,
            on_retry,
            on_wait,
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(RuntimeError::Transient("boom".to_string()))
                } else {
                    Ok(7)
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_retries_returns_last_error() {
        let gate = InMemoryGate::new();
        let cancel = CancelToken::new();
        let options = RetryOptions {
            max_retries: 1,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            jitter: Jitter::None,
            ..Default::default()
        };
        let (on_retry, on_wait) = noop_callbacks();

        let result = execute_with_retry(
            &gate,
            &options,
            &cancel,
            default_should_retry,
            on_retry,
            on_wait,
            || async { Err::<(), _>(RuntimeError::Transient("still failing".to_string())) },
        )
        .await;

        assert!(matches!(result, Err(RuntimeError::Transient(_))));
    }

    #[tokio::test]
    async fn non_retryable_error_fails_fast() {
        let gate = InMemoryGate::new();
        let cancel = CancelToken::new();
        let calls = AtomicU32::new(0);
        let options = RetryOptions {
            max_retries: 5,
            ..Default::default()
        };
        let (on_retry, on_wait) = noop_callbacks();

        let result = execute_with_retry(
            &gate,
            &options,
            &cancel,
            default_should_retry,
            on_retry,
            on_wait,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RuntimeError::NonRetryable("schema mismatch".to_string()))
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn already_cancelled_token_fails_immediately() {
        let gate = InMemoryGate::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let (on_retry, on_wait) = noop_callbacks();

        let result = execute_with_retry(
            &gate,
            &RetryOptions::default(),
            &cancel,
            default_should_retry,
            on_retry,
            on_wait,
            || async { Ok::<_, RuntimeError>(1) },
        )
        .await;

        assert!(matches!(result, Err(RuntimeError::Cancelled)));
    }

    #[tokio::test]
    async fn preexisting_gate_wait_fast_fails_when_over_budget() {
        let gate = InMemoryGate::new();
        gate.register_hit("modelX", 120_000);
        let cancel = CancelToken::new();
        let options = RetryOptions {
            rate_limit_key: Some("modelX".to_string()),
            max_rate_limit_wait_ms: 10,
            ..Default::default()
        };
        let (on_retry, on_wait) = noop_callbacks();

        let result = execute_with_retry(
            &gate,
            &options,
            &cancel,
            default_should_retry,
            on_retry,
            on_wait,
            || async { Ok::<_, RuntimeError>(1) },
        )
        .await;

        assert!(matches!(result, Err(RuntimeError::RateLimitFastFail { .. })));
    }

    #[tokio::test]
    async fn success_clears_rate_limit_key_on_the_gate() {
        let gate = InMemoryGate::new();
        let cancel = CancelToken::new();
        let options = RetryOptions {
            rate_limit_key: Some("modelX".to_string()),
            ..Default::default()
        };
        let (on_retry, on_wait) = noop_callbacks();

        let result = execute_with_retry(
            &gate,
            &options,
            &cancel,
            default_should_retry,
            on_retry,
            on_wait,
            || async { Ok::<_, RuntimeError>(1) },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(gate.snapshot("modelX").hits, 0);
    }
}
