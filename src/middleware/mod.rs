//! Provider decorators
//!
//! Every type here wraps a [`Provider`](crate::Provider) and is one itself, so
//! decorators nest in any order:
//!
//! ```text
//! TracingMiddleware            <- attaches the correlation id
//!   CircuitBreaker             <- fast-fails while the backend is unhealthy
//!     LoggingMiddleware        <- one log entry per call, off the hot path
//!       ResilientClient        <- exponential backoff retries
//!         RateLimiter          <- token-bucket admission
//!           CostEstimator      <- prices token usage
//!             backend adapter
//! ```
//!
//! [`crate::client::PipelineBuilder`] assembles this canonical order.

pub mod circuit_breaker;
pub mod correlation;
pub mod cost;
pub mod logging;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{BreakerPolicy, CircuitBreaker, CircuitState};
pub use correlation::TracingMiddleware;
pub use cost::{CostEstimator, ModelPrice, PricingTable};
pub use logging::{
    LogConfig, LogEntry, LogSink, LoggingMiddleware, NoOpSink, Operation, TracingSink,
};
pub use rate_limiter::{RateLimitPolicy, RateLimiter};
pub use retry::{ResilientClient, RetryPolicy};
