//! Request-scoped context carrying correlation identifiers, the start
//! instant, and a cooperative cancellation token. Passed explicitly — there
//! is no ambient or thread-local fallback.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub trace_id: String,
    started: Instant,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Mints a fresh context. The trace id is inherited when the caller
    /// supplied a non-empty one, otherwise freshly minted.
    pub fn new(trace_id: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            trace_id: trace_id
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            started: Instant::now(),
            cancel: CancellationToken::new(),
        }
    }

    /// Builds a context around an externally owned cancellation token, so
    /// a longer-lived scope (e.g. a workflow run) can cancel everything
    /// dispatched under it.
    pub fn with_token(trace_id: Option<String>, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::new(trace_id)
        }
    }

    /// Derives a context for a nested dispatch: new request id, inherited
    /// trace id, and a child token so cancelling the parent cancels the
    /// child but not vice versa.
    pub fn child(&self) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            trace_id: self.trace_id.clone(),
            started: Instant::now(),
            cancel: self.cancel.child_token(),
        }
    }

    /// Derives a cancellation scope for one unit execution: correlation
    /// ids and start instant are shared, only the token is a child. The
    /// gateway cancels this scope when the execution deadline expires, so
    /// the unit observes cancellation without the caller's context being
    /// cancelled.
    pub fn deadline_scope(&self) -> Self {
        Self {
            request_id: self.request_id.clone(),
            trace_id: self.trace_id.clone(),
            started: self.started,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the context is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(None)
    }
}
