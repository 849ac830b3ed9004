//! The `MemberExecutor` boundary (§6).
//!
//! The LLM-invocation subprocess itself is out of scope for this core; the
//! orchestrator only depends on this trait, the same way the reference
//! codebase's coordinator depends on an abstract model-query step
//! (`query_model`) rather than embedding a specific HTTP client inline.

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::error::RuntimeResult;

/// One member dispatch request.
#[derive(Debug, Clone)]
pub struct MemberRequest {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub prompt: String,
    pub timeout_ms: u64,
    pub cancel: CancelToken,
}

/// A successful member dispatch.
#[derive(Debug, Clone)]
pub struct MemberResponse {
    pub output: String,
    pub latency_ms: u64,
}

/// Turns a prompt into text plus latency, or fails with a status-code-bearing
/// or descriptive error. Implementations may stream text/stderr chunks to an
/// observer out of band; the trait itself only returns the final text.
#[async_trait]
pub trait MemberExecutor: Send + Sync {
    async fn execute(&self, request: MemberRequest) -> RuntimeResult<MemberResponse>;
}

/// A scripted [`MemberExecutor`] double, kept outside `#[cfg(test)]` so both
/// this crate's unit tests and the integration suite under `tests/` can
/// depend on it without a dev-only feature flag.
#[doc(hidden)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A scripted executor for tests: returns the next entry in a queue of
    /// results per call, falling back to repeating the last entry.
    pub struct ScriptedExecutor {
        script: Mutex<Vec<RuntimeResult<MemberResponse>>>,
        calls: AtomicUsize,
    }

    impl ScriptedExecutor {
        pub fn new(script: Vec<RuntimeResult<MemberResponse>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MemberExecutor for ScriptedExecutor {
        async fn execute(&self, _request: MemberRequest) -> RuntimeResult<MemberResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                panic!("ScriptedExecutor ran out of scripted responses");
            }
            if script.len() == 1 {
                script[0].clone()
            } else {
                script.remove(0)
            }
        }
    }

}
