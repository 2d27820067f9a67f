//! Error types for LLM pipeline operations.
//!
//! This module provides structured error handling for every layer of the
//! provider pipeline: backend adapters, resilience decorators, and the
//! structured-output extractor.
//!
//! # Error Types
//!
//! The main error type is [`LlmError`], which covers all failure modes:
//! - Transport failures (backend unreachable) and non-success statuses
//! - Cancellation and deadline expiry of the call context
//! - Synthetic failures raised by decorators (breaker open, retries exhausted,
//!   both fallback providers failed)
//! - Structured-output failures (schema derivation, JSON extraction, parsing)
//!
//! # Error Handling Example
//!
//! ```rust
//! use poly_llm::{LlmError, error::ErrorCategory};
//!
//! fn handle_error(err: &LlmError) {
//!     if err.is_retryable() {
//!         println!("Retryable error: {}", err);
//!     }
//!
//!     match err.category() {
//!         ErrorCategory::Transient => println!("Temporary issue, try again later"),
//!         ErrorCategory::Client => println!("Fix the request and try again"),
//!         _ => println!("{}", err.user_message()),
//!     }
//! }
//! ```

use crate::logging::{log_debug, log_error, log_warn};
use thiserror::Error;

// ============================================================================
// Error categorization types
// ============================================================================

/// High-level categorization of errors for routing and handling decisions.
///
/// Use [`LlmError::category()`] to get the category for any error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// External service failures (LLM backends, network issues).
    External,

    /// Internal failures raised by the pipeline itself.
    Internal,

    /// Client errors (invalid input, configuration, unsupported target types).
    Client,

    /// Temporary failures that should be retried.
    Transient,

    /// The caller gave up on the call (cancellation or deadline).
    Cancelled,
}

/// Severity level for logging and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Action failed but system is stable.
    Error,

    /// Unexpected but recoverable situation.
    Warning,

    /// Expected failure (e.g., caller cancellation).
    Info,
}

// ============================================================================
// LLM Error types
// ============================================================================

/// Convenient result type for LLM operations.
pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Errors that can occur anywhere in the provider pipeline.
///
/// # Error Categories
///
/// | Variant | Category | Retryable |
/// |---------|----------|-----------|
/// | `UnsupportedProvider` | Client | No |
/// | `ConfigurationError` | Client | No |
/// | `ProviderDown` | Transient | Yes |
/// | `RequestFailed` | External | Yes |
/// | `ResponseParsingError` | External | No |
/// | `Cancelled` | Cancelled | No |
/// | `DeadlineExceeded` | Cancelled | No |
/// | `CircuitOpen` | Transient | No |
/// | `RetriesExhausted` | External | No |
/// | `AllProvidersFailed` | External | No |
/// | `SchemaDerivation` | Client | No |
/// | `NoJsonFound` | External | No |
/// | `EmptyJson` | External | No |
/// | `MalformedJson` | External | No |
#[derive(Error, Debug)]
pub enum LlmError {
    /// The requested backend is not supported by the provider factory.
    #[error("Provider not supported: {provider}")]
    UnsupportedProvider {
        /// The provider name that was requested.
        provider: String,
    },

    /// Configuration is invalid or incomplete.
    #[error("Provider configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },

    /// The backend could not be reached (connection refused, DNS, timeout).
    #[error("Provider is unreachable: {message}")]
    ProviderDown {
        /// Description of the transport failure.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend answered but rejected the request.
    #[error("Request failed: {message}")]
    RequestFailed {
        /// Description of the failure.
        message: String,
        /// HTTP status reported by the backend, if any.
        status: Option<u16>,
    },

    /// The backend answered with a body that could not be decoded.
    #[error("Response parsing failed: {message}")]
    ResponseParsingError {
        /// Details about the parsing failure.
        message: String,
    },

    /// The call context was cancelled by the caller.
    #[error("Call cancelled")]
    Cancelled,

    /// The call context deadline passed before the call completed.
    #[error("Call deadline exceeded")]
    DeadlineExceeded,

    /// The circuit breaker is open and rejected the call without a network attempt.
    #[error("Circuit breaker is open for {provider}: requests are blocked")]
    CircuitOpen {
        /// Name of the protected provider.
        provider: String,
    },

    /// Every retry attempt failed.
    #[error("Max retries exceeded after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Total number of invocations made.
        attempts: u32,
        /// The failure of the last attempt.
        #[source]
        source: Box<LlmError>,
    },

    /// Both the primary and the secondary provider failed.
    #[error("Both primary ({primary}) and secondary ({secondary}) providers failed")]
    AllProvidersFailed {
        /// Name of the primary provider.
        primary: String,
        /// Name of the secondary provider.
        secondary: String,
    },

    /// A JSON schema could not be derived from the target type.
    #[error("Failed to generate schema: {message}")]
    SchemaDerivation {
        /// Why derivation failed.
        message: String,
    },

    /// The model output contained no JSON object.
    #[error("No JSON object found in response. Raw output: {raw}")]
    NoJsonFound {
        /// The raw model output.
        raw: String,
    },

    /// The model output contained only an empty or void JSON object.
    #[error("Model produced empty or void JSON. Raw output: {raw}")]
    EmptyJson {
        /// The raw model output.
        raw: String,
    },

    /// The extracted JSON did not deserialize into the target type.
    #[error("Model produced malformed JSON: {message}. Cleaned output: {extracted}")]
    MalformedJson {
        /// Deserializer error message.
        message: String,
        /// The extracted text that failed to parse.
        extracted: String,
    },
}

impl LlmError {
    /// Get the error category for routing and handling decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedProvider { .. } => ErrorCategory::Client,
            Self::ConfigurationError { .. } => ErrorCategory::Client,
            Self::ProviderDown { .. } => ErrorCategory::Transient,
            Self::RequestFailed { .. } => ErrorCategory::External,
            Self::ResponseParsingError { .. } => ErrorCategory::External,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::DeadlineExceeded => ErrorCategory::Cancelled,
            Self::CircuitOpen { .. } => ErrorCategory::Transient,
            Self::RetriesExhausted { .. } => ErrorCategory::External,
            Self::AllProvidersFailed { .. } => ErrorCategory::External,
            Self::SchemaDerivation { .. } => ErrorCategory::Client,
            Self::NoJsonFound { .. } => ErrorCategory::External,
            Self::EmptyJson { .. } => ErrorCategory::External,
            Self::MalformedJson { .. } => ErrorCategory::External,
        }
    }

    /// Get the error severity for logging and alerting.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::UnsupportedProvider { .. } => ErrorSeverity::Error,
            Self::ConfigurationError { .. } => ErrorSeverity::Error,
            Self::ProviderDown { .. } => ErrorSeverity::Warning,
            Self::RequestFailed { .. } => ErrorSeverity::Error,
            Self::ResponseParsingError { .. } => ErrorSeverity::Warning,
            Self::Cancelled | Self::DeadlineExceeded => ErrorSeverity::Info,
            Self::CircuitOpen { .. } => ErrorSeverity::Warning,
            Self::RetriesExhausted { .. } => ErrorSeverity::Error,
            Self::AllProvidersFailed { .. } => ErrorSeverity::Error,
            Self::SchemaDerivation { .. } => ErrorSeverity::Error,
            Self::NoJsonFound { .. } | Self::EmptyJson { .. } | Self::MalformedJson { .. } => {
                ErrorSeverity::Warning
            }
        }
    }

    /// Whether this error is transient and worth another attempt.
    ///
    /// Transport failures and non-success statuses are retryable; cancellation
    /// and the synthetic decorator errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderDown { .. } | Self::RequestFailed { .. }
        )
    }

    /// Whether this error reports that the caller gave up on the call.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Convert to a user-friendly message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedProvider { .. } => {
                "The requested AI provider is not supported".to_string()
            }
            Self::ConfigurationError { .. } => {
                "AI service configuration issue. Please check your settings".to_string()
            }
            Self::ProviderDown { .. } => {
                "AI service is unreachable. Please try again later".to_string()
            }
            Self::RequestFailed { .. } | Self::RetriesExhausted { .. } => {
                "Unable to communicate with AI service. Please try again".to_string()
            }
            Self::ResponseParsingError { .. } => {
                "Received an invalid response from AI service".to_string()
            }
            Self::Cancelled => "Request was cancelled".to_string(),
            Self::DeadlineExceeded => "Request timed out. Please try again".to_string(),
            Self::CircuitOpen { .. } => {
                "AI service is temporarily disabled after repeated failures".to_string()
            }
            Self::AllProvidersFailed { .. } => "All AI services are unavailable".to_string(),
            Self::SchemaDerivation { .. } => "Unsupported response format requested".to_string(),
            Self::NoJsonFound { .. } | Self::EmptyJson { .. } | Self::MalformedJson { .. } => {
                "AI service returned data in an unexpected format".to_string()
            }
        }
    }

    // =========================================================================
    // Constructor methods with automatic logging
    // =========================================================================

    pub fn unsupported_provider(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        log_error!(
            provider = %provider,
            error_type = "unsupported_provider",
            "Unsupported LLM provider requested"
        );
        Self::UnsupportedProvider { provider }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration_error",
            message = %message,
            "LLM configuration validation failed"
        );
        Self::ConfigurationError { message }
    }

    pub fn provider_down(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "provider_down",
            message = %message,
            has_source = source.is_some(),
            "LLM provider unreachable"
        );
        Self::ProviderDown { message, source }
    }

    pub fn request_failed(message: impl Into<String>, status: Option<u16>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "request_failed",
            message = %message,
            status = ?status,
            "LLM request rejected by provider"
        );
        Self::RequestFailed { message, status }
    }

    pub fn response_parsing_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "response_parsing_error",
            message = %message,
            "LLM response format invalid"
        );
        Self::ResponseParsingError { message }
    }

    pub fn circuit_open(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        log_debug!(
            error_type = "circuit_open",
            provider = %provider,
            "Call rejected by open circuit breaker"
        );
        Self::CircuitOpen { provider }
    }

    pub fn retries_exhausted(attempts: u32, last: LlmError) -> Self {
        log_error!(
            error_type = "retries_exhausted",
            attempts = attempts,
            last_error = %last,
            "Request failed after all retry attempts"
        );
        Self::RetriesExhausted {
            attempts,
            source: Box::new(last),
        }
    }

    pub fn all_providers_failed(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        let primary = primary.into();
        let secondary = secondary.into();
        log_error!(
            error_type = "all_providers_failed",
            primary = %primary,
            secondary = %secondary,
            "Both primary and secondary providers failed"
        );
        Self::AllProvidersFailed { primary, secondary }
    }

    pub fn schema_derivation(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "schema_derivation",
            message = %message,
            "Could not derive JSON schema for target type"
        );
        Self::SchemaDerivation { message }
    }

    pub fn no_json_found(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        log_warn!(
            error_type = "no_json_found",
            raw_length = raw.len(),
            "No JSON object in structured output"
        );
        Self::NoJsonFound { raw }
    }

    pub fn empty_json(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        log_warn!(
            error_type = "empty_json",
            "Structured output was empty"
        );
        Self::EmptyJson { raw }
    }

    pub fn malformed_json(message: impl Into<String>, extracted: impl Into<String>) -> Self {
        let message = message.into();
        let extracted = extracted.into();
        log_warn!(
            error_type = "malformed_json",
            message = %message,
            "Structured output did not match target type"
        );
        Self::MalformedJson { message, extracted }
    }
}
