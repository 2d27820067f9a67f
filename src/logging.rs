//! Logging utilities for poly-llm
//!
//! Re-exports tracing macros with log_* naming convention for consistency.
//! Per-call telemetry (log entries) goes through [`crate::middleware::logging::LogSink`];
//! these macros are for the crate's own diagnostics.

// Re-export tracing macros with log_* naming
pub use tracing::{debug as log_debug, error as log_error, info as log_info, warn as log_warn};
