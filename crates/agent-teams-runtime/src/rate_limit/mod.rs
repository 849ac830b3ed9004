//! Rate-limit gate (§4.5): a shared, adaptive hit-count map keyed by model/
//! provider, with an in-memory implementation for tests and a file-backed
//! one for cross-process sharing (§9 redesign note).

mod file_backed;
mod gate;
mod in_memory;

pub use file_backed::FileBackedGate;
pub use gate::{GateSnapshot, GateState, RateLimitEntry};
pub use in_memory::InMemoryGate;

/// Abstraction over the rate-limit gate's storage so the retry executor and
/// admission controller don't need to know whether state lives in memory or
/// on disk.
pub trait SharedGate: Send + Sync {
    /// Current wait/hit state for `key`, folded together with the global key.
    fn snapshot(&self, key: &str) -> GateSnapshot;

    /// Records a 429/rate-limit signal for `key`, with the provider's
    /// suggested retry delay if one was present on the response.
    fn register_hit(&self, key: &str, suggested_delay_ms: u64);

    /// Records a successful call for `key`, decaying its hit counter.
    fn register_success(&self, key: &str);
}
