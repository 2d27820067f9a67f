//! Request-scoped call metadata
//!
//! A [`CallContext`] travels alongside every request through the decorator
//! chain. It carries the correlation id and the caller's cancellation signal
//! (an explicit token plus an optional deadline).

use crate::error::LlmError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call metadata passed explicitly next to the [`ChatRequest`](crate::ChatRequest)
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    trace_id: Option<String>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach (or replace) the correlation id
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Use the given token as this call's cancellation signal
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Fail the call once `deadline` passes
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fail the call once `timeout` has elapsed from now
    pub fn with_timeout(self, timeout: std::time::Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cancellation error if the call has been cancelled or has expired
    pub fn err(&self) -> Option<LlmError> {
        if self.cancellation.is_cancelled() {
            return Some(LlmError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(LlmError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves with the cancellation error once the call is cancelled or expires
    ///
    /// Intended for `tokio::select!` against a suspension point.
    pub async fn done(&self) -> LlmError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancellation.cancelled() => LlmError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => LlmError::DeadlineExceeded,
                }
            }
            None => {
                self.cancellation.cancelled().await;
                LlmError::Cancelled
            }
        }
    }
}
