//! Retry decorator with exponential backoff
//!
//! [`ResilientClient`] re-issues failed unary calls, sleeping
//! `base_delay * 2^attempt` (capped at `max_delay`) between attempts. Both
//! the attempt loop and the sleep observe the call context: a cancelled or
//! expired call returns the cancellation error, never "retries exhausted".
//!
//! Streams are not retried; a partially delivered stream cannot be replayed.

use crate::config::ProviderOptions;
use crate::core_types::{CallContext, ChatRequest, ChatResponse, PacketStream, Provider};
use crate::error::{LlmError, LlmResult};
use crate::logging::log_debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total invocations = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Replace zero fields with the defaults
    pub fn normalized(mut self) -> Self {
        if self.max_retries == 0 {
            self.max_retries = DEFAULT_MAX_RETRIES;
        }
        if self.base_delay.is_zero() {
            self.base_delay = DEFAULT_BASE_DELAY;
        }
        if self.max_delay.is_zero() {
            self.max_delay = DEFAULT_MAX_DELAY;
        }
        self
    }

    /// Delay after the failed attempt with zero-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Provider decorator that retries failed unary calls
#[derive(Debug)]
pub struct ResilientClient<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: Provider> ResilientClient<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy: policy.normalized(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait::async_trait]
impl<P: Provider> Provider for ResilientClient<P> {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        self.inner.configure(options)
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        let max_attempts = self.policy.max_retries + 1;
        let mut attempt = 0;

        loop {
            let error = match self.inner.generate(ctx, request).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            log_debug!(
                provider = %self.inner.name(),
                attempt = attempt + 1,
                max_attempts = max_attempts,
                error = %error,
                "Attempt failed"
            );

            if error.is_cancellation() {
                return Err(error);
            }
            if let Some(cancelled) = ctx.err() {
                return Err(cancelled);
            }
            if attempt == self.policy.max_retries {
                return Err(LlmError::retries_exhausted(max_attempts, error));
            }

            let delay = self.policy.delay_for(attempt);
            log_debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying after delay"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                cancelled = ctx.done() => return Err(cancelled),
            }

            attempt += 1;
        }
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        self.inner.generate_stream(ctx, request).await
    }

    fn name(&self) -> String {
        format!("{} (Resilient)", self.inner.name())
    }
}
