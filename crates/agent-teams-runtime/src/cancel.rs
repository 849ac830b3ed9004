//! Cooperative cancellation (§5, §9 redesign note).
//!
//! Wraps [`tokio_util::sync::CancellationToken`] rather than threading
//! coroutine-style abort signals by hand. Every suspension point in the
//! orchestrator, admission controller, and retry executor takes a
//! `CancelToken` and returns promptly after it trips.

use tokio_util::sync::CancellationToken;

/// A cancel signal that can be observed and that derives linked child tokens.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    /// Creates a fresh, unlinked root token.
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    /// Derives a child token: cancelling the parent cancels the child, but
    /// cancelling (or dropping) the child never affects the parent. The
    /// child's registration is released automatically when it is dropped,
    /// so fan-out across many member dispatches does not accumulate
    /// handlers on the root token.
    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    /// Trips the token, waking every waiter derived from it.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Whether this token (or an ancestor) has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once the token is cancelled. Intended for use in `tokio::select!`.
    pub async fn cancelled(&self) {
        self.0.cancelled().await;
    }
}
