use crate::client::{create_provider, PipelineBuilder};
use crate::config::{PipelineConfig, ProviderOptions};
use crate::core_types::{CallContext, Provider, TokenUsage};
use crate::error::LlmError;
use crate::middleware::{BreakerPolicy, PricingTable, RetryPolicy};
use crate::tests::helpers::{capturing_sink, create_test_request, next_entry, ScriptedProvider};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.retry = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        };
        config.breaker = BreakerPolicy {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(30),
        };
        config
    }

    // Unit Tests for create_provider
    //
    // UNIT UNDER TEST: create_provider (backend factory)
    //
    // BUSINESS RESPONSIBILITY:
    //   - Builds a backend adapter from its name and options
    //   - Rejects names it does not know
    //
    // TEST COVERAGE:
    //   - Known backends with options applied
    //   - Hosted backend without an API key
    //   - Unknown backend error

    #[test]
    fn test_create_known_provider_applies_options() {
        // Arrange
        let options = ProviderOptions::new().with_model("tinyllama");

        // Act
        let provider = create_provider("Ollama", &options).expect("ollama is supported");

        // Assert
        assert_eq!(provider.name(), "Ollama Local (tinyllama)");
    }

    #[test]
    fn test_create_hosted_provider_with_api_key() {
        // Arrange
        let options = ProviderOptions::new()
            .with_api_key("sk-test")
            .with_model("gpt-4o");

        // Act
        let provider = create_provider("openai", &options).expect("openai is supported");

        // Assert
        assert_eq!(provider.name(), "OpenAI (gpt-4o)");
    }

    #[test]
    fn test_create_hosted_provider_without_api_key_fails() {
        // Arrange & Act
        let result = create_provider("openai", &ProviderOptions::new().with_model("gpt-4o"));

        // Assert
        match result {
            Err(LlmError::ConfigurationError { message }) => {
                assert!(message.contains("API key"), "got: {message}");
            }
            Err(other) => panic!("Expected ConfigurationError, got {other:?}"),
            Ok(_) => panic!("Expected ConfigurationError, got a provider"),
        }
    }

    #[test]
    fn test_create_unknown_provider_fails() {
        // Arrange & Act
        let result = create_provider("watson", &ProviderOptions::default());

        // Assert
        match result {
            Err(LlmError::UnsupportedProvider { provider }) => assert_eq!(provider, "watson"),
            Err(other) => panic!("Expected UnsupportedProvider, got {other:?}"),
            Ok(_) => panic!("Expected UnsupportedProvider, got a provider"),
        }
    }

    // Unit Tests for PipelineBuilder
    //
    // UNIT UNDER TEST: PipelineBuilder (canonical decorator chain)
    //
    // BUSINESS RESPONSIBILITY:
    //   - Wraps a backend in cost, rate limit, retry, logging, breaker and tracing layers
    //   - Makes the composed chain usable as a single Provider
    //
    // TEST COVERAGE:
    //   - Name composition reflects layer order
    //   - Retry recovers and cost/logging/trace id all apply in one call
    //   - Breaker counts one exhausted retry sequence as one failure

    #[test]
    fn test_pipeline_name_reflects_layer_order() {
        // Arrange
        let builder = PipelineBuilder::new(PipelineConfig::default());

        // Act
        let pipeline = builder.wrap(ScriptedProvider::succeeding("backend", "ok"));

        // Assert
        assert_eq!(pipeline.name(), "backend (Resilient) (Protected)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_end_to_end_success() {
        // Arrange
        let (sink, mut rx) = capturing_sink();
        let backend = Arc::new(
            ScriptedProvider::succeeding("backend", "hello")
                .failing_first(1)
                .with_usage(TokenUsage::new(50, 20)),
        );
        let pipeline = PipelineBuilder::new(fast_config())
            .with_pricing(PricingTable::standard())
            .with_sink(sink)
            .wrap(Arc::clone(&backend));

        // Act
        let response = pipeline
            .generate(&CallContext::new(), &create_test_request("gpt-4o"))
            .await
            .expect("retry should recover");
        let entry = next_entry(&mut rx).await;

        // Assert
        assert_eq!(response.content, "hello");
        assert!(response.usage.cost_usd > 0.0, "Cost estimated inside the retry loop");
        assert_eq!(backend.calls(), 2);
        assert!(!entry.is_error(), "One entry for the logical call after retries");
        assert!(entry.cost_usd > 0.0);
        let seen = backend.trace_ids();
        assert!(seen.iter().all(|id| id.is_some() && *id == entry.trace_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_breaker_wraps_retry_sequence() {
        // Arrange
        let backend = Arc::new(ScriptedProvider::failing("backend"));
        let pipeline = PipelineBuilder::new(fast_config()).wrap(Arc::clone(&backend));
        let request = create_test_request("llama3");

        // Act
        let first = pipeline.generate(&CallContext::new(), &request).await;
        let second = pipeline.generate(&CallContext::new(), &request).await;

        // Assert
        assert!(matches!(first, Err(LlmError::RetriesExhausted { attempts: 3, .. })));
        assert!(matches!(second, Err(LlmError::CircuitOpen { .. })));
        assert_eq!(backend.calls(), 3, "Open breaker stops the retry layer entirely");
    }

    #[test]
    fn test_build_rejects_unknown_backend() {
        // Arrange
        let mut config = PipelineConfig::new("watson");
        config.options.api_key = Some("key".to_string());

        // Act
        let result = PipelineBuilder::new(config).build();

        // Assert
        assert!(matches!(result, Err(LlmError::UnsupportedProvider { .. })));
    }
}
