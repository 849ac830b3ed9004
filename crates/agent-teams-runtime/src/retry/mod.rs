//! Bounded-retry execution with backoff, jitter, and rate-limit-gate
//! integration (§4.4).

mod executor;

pub use executor::{default_should_retry, execute_with_retry, Jitter, RetryOptions};
