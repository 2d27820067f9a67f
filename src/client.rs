//! Backend factory and pipeline assembly

use crate::config::{PipelineConfig, ProviderOptions};
use crate::core_types::Provider;
use crate::error::{LlmError, LlmResult};
use crate::logging::log_debug;
use crate::middleware::{
    CircuitBreaker, CostEstimator, LogSink, LoggingMiddleware, PricingTable, RateLimiter,
    ResilientClient, TracingMiddleware, TracingSink,
};
use crate::providers::{OllamaProvider, OpenAIProvider};
use std::sync::Arc;

/// Backends [`create_provider`] knows how to build
pub const SUPPORTED_PROVIDERS: &[&str] = &["ollama", "openai"];

/// Build a backend adapter by name
///
/// # Errors
///
/// Returns [`LlmError::UnsupportedProvider`] if the provider name is not recognized.
/// Supported providers are listed in [`SUPPORTED_PROVIDERS`].
///
/// Returns [`LlmError::ConfigurationError`] if the adapter cannot be initialized,
/// including a hosted backend built without an API key.
pub fn create_provider(name: &str, options: &ProviderOptions) -> LlmResult<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match name.trim().to_lowercase().as_str() {
        "ollama" => Arc::new(OllamaProvider::with_options(options)?),
        "openai" => Arc::new(OpenAIProvider::with_options(options)?),
        _ => return Err(LlmError::unsupported_provider(name)),
    };

    log_debug!(
        provider = name,
        name = %provider.name(),
        "Backend provider created"
    );
    Ok(provider)
}

/// Assembles the canonical decorator chain around a backend
///
/// ```text
/// backend -> CostEstimator -> RateLimiter (if enabled) -> ResilientClient
///         -> LoggingMiddleware -> CircuitBreaker -> TracingMiddleware
/// ```
///
/// The breaker sits outside the retry loop, so one exhausted retry sequence
/// counts as a single breaker failure.
pub struct PipelineBuilder {
    config: PipelineConfig,
    pricing: PricingTable,
    sink: Arc<dyn LogSink>,
}

impl PipelineBuilder {
    /// Builder with the standard pricing table and a [`TracingSink`]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            pricing: PricingTable::standard(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Builder configured from environment variables
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigurationError`] if the environment holds
    /// invalid values; see [`PipelineConfig::from_env`].
    pub fn from_env() -> LlmResult<Self> {
        Ok(Self::new(PipelineConfig::from_env()?))
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Create the configured backend and wrap it
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigurationError`] if the configuration is
    /// invalid, and [`LlmError::UnsupportedProvider`] for unknown backends.
    pub fn build(self) -> LlmResult<Arc<dyn Provider>> {
        self.config.validate()?;
        let backend = create_provider(&self.config.provider, &self.config.options)?;
        Ok(self.wrap(backend))
    }

    /// Wrap an existing backend in the decorator chain
    pub fn wrap<P: Provider + 'static>(self, backend: P) -> Arc<dyn Provider> {
        let Self {
            config,
            pricing,
            sink,
        } = self;

        let priced = CostEstimator::new(backend, pricing);
        let admitted: Box<dyn Provider> = if config.rate_limit.is_enabled() {
            Box::new(RateLimiter::new(priced, config.rate_limit))
        } else {
            Box::new(priced)
        };
        let resilient = ResilientClient::new(admitted, config.retry);
        let logged = LoggingMiddleware::new(resilient, sink, config.logging);
        let protected = CircuitBreaker::new(logged, config.breaker);
        let pipeline = TracingMiddleware::new(protected);

        log_debug!(
            provider = %config.provider,
            name = %pipeline.name(),
            rate_limited = config.rate_limit.is_enabled(),
            "Provider pipeline assembled"
        );

        Arc::new(pipeline)
    }
}
