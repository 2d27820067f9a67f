//! Correlation id propagation
//!
//! [`TracingMiddleware`] makes sure every call below it carries a trace id in
//! its [`CallContext`]. An id supplied by the caller is kept as is; otherwise
//! a UUID v4 is generated once here and reused by everything downstream.
//! The delegated call also runs inside a `tracing` span tagged with the id.

use crate::config::ProviderOptions;
use crate::core_types::{CallContext, ChatRequest, ChatResponse, PacketStream, Provider};
use crate::error::LlmResult;
use std::borrow::Cow;
use tracing::Instrument;
use uuid::Uuid;

/// Provider decorator that guarantees a correlation id
#[derive(Debug)]
pub struct TracingMiddleware<P> {
    inner: P,
}

impl<P: Provider> TracingMiddleware<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

/// Return `ctx` unchanged if it has a trace id, otherwise a copy with a fresh one
pub fn ensure_trace_id(ctx: &CallContext) -> Cow<'_, CallContext> {
    match ctx.trace_id() {
        Some(_) => Cow::Borrowed(ctx),
        None => Cow::Owned(ctx.clone().with_trace_id(Uuid::new_v4().to_string())),
    }
}

#[async_trait::async_trait]
impl<P: Provider> Provider for TracingMiddleware<P> {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        self.inner.configure(options)
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        let ctx = ensure_trace_id(ctx);
        let span = tracing::debug_span!(
            "llm_call",
            operation = "Generate",
            trace_id = ctx.trace_id().unwrap_or_default()
        );
        self.inner.generate(&ctx, request).instrument(span).await
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        let ctx = ensure_trace_id(ctx);
        let span = tracing::debug_span!(
            "llm_call",
            operation = "GenerateStream",
            trace_id = ctx.trace_id().unwrap_or_default()
        );
        self.inner.generate_stream(&ctx, request).instrument(span).await
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}
