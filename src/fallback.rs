//! Primary/secondary failover

use crate::config::ProviderOptions;
use crate::core_types::{CallContext, ChatRequest, ChatResponse, PacketStream, Provider};
use crate::error::{LlmError, LlmResult};
use crate::logging::log_warn;

/// Provider that retries a failed unary call on a secondary provider
///
/// Streams always go to the primary; a stream that fails mid-flight is not
/// replayed on the secondary.
#[derive(Debug)]
pub struct FallbackClient<A, B> {
    primary: A,
    secondary: B,
}

impl<A: Provider, B: Provider> FallbackClient<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &A {
        &self.primary
    }

    pub fn secondary(&self) -> &B {
        &self.secondary
    }
}

#[async_trait::async_trait]
impl<A: Provider, B: Provider> Provider for FallbackClient<A, B> {
    /// Configure the primary, then the secondary; stops at the first failure
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        self.primary.configure(options)?;
        self.secondary.configure(options)
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        let primary_error = match self.primary.generate(ctx, request).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        if primary_error.is_cancellation() {
            return Err(primary_error);
        }
        if let Some(cancelled) = ctx.err() {
            return Err(cancelled);
        }

        log_warn!(
            primary = %self.primary.name(),
            secondary = %self.secondary.name(),
            error = %primary_error,
            "Primary provider failed, falling back to secondary"
        );

        match self.secondary.generate(ctx, request).await {
            Ok(response) => Ok(response),
            Err(secondary_error) if secondary_error.is_cancellation() => Err(secondary_error),
            Err(secondary_error) => {
                log_warn!(
                    secondary = %self.secondary.name(),
                    error = %secondary_error,
                    "Secondary provider failed"
                );
                Err(LlmError::all_providers_failed(
                    self.primary.name(),
                    self.secondary.name(),
                ))
            }
        }
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        self.primary.generate_stream(ctx, request).await
    }

    fn name(&self) -> String {
        format!(
            "Fallback ({} -> {})",
            self.primary.name(),
            self.secondary.name()
        )
    }
}
