//! Configuration for backend adapters and provider pipelines
//!
//! Adapters hold a [`ProviderSettings`] and change it only through
//! [`ProviderSettings::apply`], which overlays a [`ProviderOptions`] field by
//! field: absent, blank and zero values leave the current setting alone.
//!
//! [`PipelineConfig`] bundles the backend choice with the policies of every
//! decorator. [`PipelineConfig::from_env`] builds one from `AI_*` environment
//! variables and validates it.

use crate::error::{LlmError, LlmResult};
use crate::logging::log_debug;
use crate::middleware::{BreakerPolicy, LogConfig, RateLimitPolicy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PROVIDER: &str = "ollama";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Backends that cannot be called without an API key
pub const HOSTED_PROVIDERS: &[&str] = &["openai"];

/// Option overrides accepted by [`Provider::configure`](crate::Provider::configure)
///
/// Every field is optional. `None`, empty strings and zero numbers mean
/// "keep the current value", so configuring twice with empty options changes
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    /// Per-request timeout
    pub timeout: Option<Duration>,
}

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Settings currently in effect for a backend adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: f64,
    pub timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL, DEFAULT_OLLAMA_MODEL)
    }
}

impl ProviderSettings {
    /// Settings for a backend at `base_url` serving `model` by default
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: base_url.into(),
            model: model.into(),
            max_tokens: None,
            temperature: 0.7,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overlay `options` field by field; absent, empty and zero values are skipped
    pub fn apply(&mut self, options: &ProviderOptions) {
        if let Some(api_key) = non_empty(&options.api_key) {
            self.api_key = Some(api_key.to_string());
        }
        if let Some(base_url) = non_empty(&options.base_url) {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty(&options.model) {
            self.model = model.to_string();
        }
        if let Some(max_tokens) = options.max_tokens.filter(|n| *n > 0) {
            self.max_tokens = Some(max_tokens);
        }
        if let Some(temperature) = options.temperature.filter(|t| *t > 0.0) {
            self.temperature = temperature;
        }
        if let Some(timeout) = options.timeout.filter(|t| !t.is_zero()) {
            self.timeout = timeout;
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Everything needed to assemble a decorated provider pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Backend name understood by [`create_provider`](crate::client::create_provider)
    pub provider: String,
    pub options: ProviderOptions,
    pub rate_limit: RateLimitPolicy,
    pub retry: RetryPolicy,
    pub breaker: BreakerPolicy,
    pub logging: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            options: ProviderOptions::default(),
            rate_limit: RateLimitPolicy::default(),
            retry: RetryPolicy::default(),
            breaker: BreakerPolicy::default(),
            logging: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    /// This is the ONLY method that should access environment variables
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigurationError`] if:
    /// - A numeric or boolean variable cannot be parsed
    /// - The resulting configuration fails [`validate`](Self::validate)
    pub fn from_env() -> LlmResult<Self> {
        let provider = std::env::var("AI_PROVIDER")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
            .to_lowercase();

        log_debug!(
            target_provider = %provider,
            "Loading pipeline configuration from environment"
        );

        let mut config = Self::new(provider);
        config.options.model = env_string("AI_MODEL");
        config.options.api_key = env_string("AI_API_KEY");
        config.options.base_url = env_string("AI_BASE_URL");

        if let Some(rate) = parse_env::<u32>("AI_RATE_LIMIT")? {
            config.rate_limit.requests_per_second = rate;
        }
        if let Some(burst) = parse_env::<u32>("AI_RATE_BURST")? {
            config.rate_limit.burst = burst;
        }
        if let Some(max_retries) = parse_env::<u32>("AI_MAX_RETRIES")? {
            config.retry.max_retries = max_retries;
        }
        if let Some(ms) = parse_env::<u64>("AI_RETRY_BASE_DELAY_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>("AI_RETRY_MAX_DELAY_MS")? {
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(threshold) = parse_env::<u32>("AI_BREAKER_THRESHOLD")? {
            config.breaker.failure_threshold = threshold;
        }
        if let Some(secs) = parse_env::<u64>("AI_BREAKER_RESET_SECS")? {
            config.breaker.reset_timeout = Duration::from_secs(secs);
        }
        if let Some(log_payloads) = parse_env::<bool>("AI_LOG_PAYLOADS")? {
            config.logging.log_payloads = log_payloads;
        }
        if let Some(errors_only) = parse_env::<bool>("AI_LOG_ERRORS_ONLY")? {
            config.logging.log_errors_only = errors_only;
        }

        config.validate()?;

        log_debug!(
            provider = %config.provider,
            has_api_key = config.options.api_key.is_some(),
            rate_limit = config.rate_limit.requests_per_second,
            max_retries = config.retry.max_retries,
            breaker_threshold = config.breaker.failure_threshold,
            "Pipeline configuration loaded and validated"
        );

        Ok(config)
    }

    /// Validate the configuration is complete
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigurationError`] if the provider name is blank,
    /// a hosted provider has no API key, or the breaker threshold is zero.
    pub fn validate(&self) -> LlmResult<()> {
        if self.provider.trim().is_empty() {
            return Err(LlmError::configuration_error("Provider name is required"));
        }
        let hosted = HOSTED_PROVIDERS.contains(&self.provider.trim().to_lowercase().as_str());
        if hosted && non_empty(&self.options.api_key).is_none() {
            return Err(LlmError::configuration_error(format!(
                "API key is required for provider '{}'",
                self.provider
            )));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(LlmError::configuration_error(
                "Breaker failure threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an optional environment variable; present but unparsable is an error
fn parse_env<T: std::str::FromStr>(key: &str) -> LlmResult<Option<T>> {
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            LlmError::configuration_error(format!("Invalid value for {key}: '{raw}'"))
        }),
    }
}
