//! Token-bucket admission control
//!
//! Each call (unary or streaming) must take one cell from a `governor` bucket
//! before it reaches the wrapped provider. Callers wait for a cell rather than
//! being rejected; the wait ends early with the cancellation error if the
//! call context is cancelled, in which case the provider is never invoked.

use crate::config::ProviderOptions;
use crate::core_types::{CallContext, ChatRequest, ChatResponse, PacketStream, Provider};
use crate::error::LlmResult;
use crate::logging::log_debug;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as Bucket};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Admission rate settings; a zero rate disables throttling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RateLimitPolicy {
    pub requests_per_second: u32,
    /// Calls admitted back-to-back from a full bucket; zero means same as the rate
    pub burst: u32,
}

impl RateLimitPolicy {
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        Self {
            requests_per_second,
            burst,
        }
    }

    /// Whether this policy throttles at all
    pub fn is_enabled(&self) -> bool {
        self.requests_per_second > 0
    }

    fn quota(&self) -> Option<Quota> {
        let rate = NonZeroU32::new(self.requests_per_second)?;
        let burst = NonZeroU32::new(self.burst).unwrap_or(rate);
        Some(Quota::per_second(rate).allow_burst(burst))
    }
}

/// Provider decorator that throttles call admission
pub struct RateLimiter<P> {
    inner: P,
    policy: RateLimitPolicy,
    bucket: Option<DefaultDirectRateLimiter>,
}

impl<P> std::fmt::Debug for RateLimiter<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<P: Provider> RateLimiter<P> {
    pub fn new(inner: P, policy: RateLimitPolicy) -> Self {
        let bucket = policy.quota().map(Bucket::direct);
        Self {
            inner,
            policy,
            bucket,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    async fn acquire(&self, ctx: &CallContext) -> LlmResult<()> {
        if let Some(cancelled) = ctx.err() {
            return Err(cancelled);
        }
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };
        if bucket.check().is_ok() {
            return Ok(());
        }

        log_debug!(
            requests_per_second = self.policy.requests_per_second,
            "Rate limit reached, waiting for admission"
        );
        tokio::select! {
            _ = bucket.until_ready() => Ok(()),
            cancelled = ctx.done() => Err(cancelled),
        }
    }
}

#[async_trait::async_trait]
impl<P: Provider> Provider for RateLimiter<P> {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        self.inner.configure(options)
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        self.acquire(ctx).await?;
        self.inner.generate(ctx, request).await
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        self.acquire(ctx).await?;
        self.inner.generate_stream(ctx, request).await
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}
