//! # poly-llm
//!
//! Provider-agnostic chat-completion client built from composable decorators.
//!
//! ## Key Features
//!
//! - **One capability**: every backend and every decorator implements [`Provider`]
//! - **Resilience**: circuit breaker, exponential-backoff retries, token-bucket rate limiting
//! - **Cost accounting**: per-model pricing applied to token usage
//! - **Observability**: one log entry per call, correlation ids on every call
//! - **Failover**: primary/secondary [`FallbackClient`]
//! - **Structured output**: schema-guided JSON generation into your own types
//! - **Backends**: local Ollama and hosted OpenAI (or compatible) adapters
//!
//! ## Example
//!
//! ```rust,no_run
//! use poly_llm::{
//!     CallContext, ChatMessage, ChatRequest, PipelineBuilder, PipelineConfig, Provider,
//! };
//!
//! # async fn example() -> poly_llm::LlmResult<()> {
//! let mut config = PipelineConfig::new("ollama");
//! config.rate_limit.requests_per_second = 5;
//!
//! let provider = PipelineBuilder::new(config).build()?;
//! let request = ChatRequest::new("llama3", vec![ChatMessage::user("Hello, how are you?")]);
//! let response = provider.generate(&CallContext::new(), &request).await?;
//! println!("{} (${:.6})", response.content, response.usage.cost_usd);
//! # Ok(())
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]

pub mod core_types;

// Logging utilities (re-exports tracing with log_* naming) - internal only
pub(crate) mod logging;

pub mod client;
pub mod config;
pub mod error;
pub mod fallback;
pub mod middleware;
pub mod providers;
pub mod response_parser;
pub mod structured;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use client::{create_provider, PipelineBuilder};
pub use config::{PipelineConfig, ProviderOptions, ProviderSettings};
pub use error::{LlmError, LlmResult};
pub use fallback::FallbackClient;
pub use middleware::{
    BreakerPolicy, CircuitBreaker, CircuitState, CostEstimator, LogConfig, LogEntry, LogSink,
    LoggingMiddleware, ModelPrice, NoOpSink, Operation, PricingTable, RateLimitPolicy,
    RateLimiter, ResilientClient, RetryPolicy, TracingMiddleware, TracingSink,
};
pub use providers::{OllamaProvider, OpenAIProvider};
pub use response_parser::ResponseParser;
pub use structured::{derive_schema, generate_struct};

pub use core_types::{
    CallContext, ChatMessage, ChatRequest, ChatResponse, ContentPart, MessageRole, PacketStream,
    StreamPacket, TokenUsage,
};
// Provider trait
pub use core_types::Provider;
