//! Provider trait and response types
//!
//! Defines the [`Provider`] trait that every backend and every decorator
//! implements, along with the unary response and streaming packet types.

use crate::config::ProviderOptions;
use crate::core_types::context::CallContext;
use crate::core_types::messages::ChatRequest;
use crate::error::{LlmError, LlmResult};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Token usage information
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    #[serde(rename = "prompt_tokens")]
    pub input_tokens: u32,
    /// Number of tokens in the completion
    #[serde(rename = "completion_tokens")]
    pub output_tokens: u32,
    /// Total tokens used (input + output)
    pub total_tokens: u32,
    /// Estimated cost in USD; zero until a cost estimator annotates it
    #[serde(default)]
    pub cost_usd: f64,
}

impl TokenUsage {
    /// Build a usage record with `total_tokens` computed from the parts
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            cost_usd: 0.0,
        }
    }
}

/// Response from a unary generate call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatResponse {
    /// Final text content
    pub content: String,
    pub usage: TokenUsage,
    #[serde(default)]
    pub cached: bool,
    /// Model the backend reports having used, if it reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ChatResponse {
    pub fn new(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            usage,
            ..Default::default()
        }
    }
}

/// One element of a streamed response
#[derive(Debug)]
pub enum StreamPacket {
    /// Incremental text
    Chunk(String),
    /// Terminal usage record (at most one per stream), with the model the
    /// backend reports having used
    Usage {
        usage: TokenUsage,
        model: Option<String>,
    },
    /// Terminal error; nothing after it is authoritative
    Error(LlmError),
}

impl StreamPacket {
    /// Usage packet without a reported model
    pub fn usage(usage: TokenUsage) -> Self {
        StreamPacket::Usage { usage, model: None }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamPacket::Error(_))
    }
}

/// Lazy, finite, non-restartable packet sequence
pub type PacketStream = BoxStream<'static, StreamPacket>;

/// Trait for chat-completion providers
///
/// Implemented by backend adapters and by every decorator, so decorators can
/// be nested to any depth. Decorator names compose: a breaker around a retry
/// client around "Ollama (llama3)" reports "Ollama (llama3) (Resilient) (Protected)".
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Apply option overrides; absent or zero fields keep their current value
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()>;

    /// Produce a complete response
    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse>;

    /// Produce an incremental response
    ///
    /// An `Err` means the stream could not be set up; failures after setup
    /// arrive as a terminal [`StreamPacket::Error`].
    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream>;

    /// Human-readable identity for logging and debugging
    fn name(&self) -> String;
}

#[async_trait::async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        (**self).configure(options)
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        (**self).generate(ctx, request).await
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        (**self).generate_stream(ctx, request).await
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

#[async_trait::async_trait]
impl<P: Provider + ?Sized> Provider for Box<P> {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        (**self).configure(options)
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        (**self).generate(ctx, request).await
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        (**self).generate_stream(ctx, request).await
    }

    fn name(&self) -> String {
        (**self).name()
    }
}
