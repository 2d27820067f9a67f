//! Per-call telemetry
//!
//! [`LoggingMiddleware`] measures every call it forwards and hands one
//! [`LogEntry`] per logical call to a pluggable [`LogSink`]. The sink always
//! runs on a background task: unary entries are emitted from a detached task,
//! and stream entries from the relay task once the stream has been drained.
//! A slow or failing sink therefore never changes the caller's result or
//! latency.

use crate::config::ProviderOptions;
use crate::core_types::{
    CallContext, ChatRequest, ChatResponse, PacketStream, Provider, StreamPacket, TokenUsage,
};
use crate::error::LlmResult;
use crate::logging::{log_info, log_warn};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

/// Default cap on logged payload text, in characters
pub const DEFAULT_MAX_PAYLOAD_CHARS: usize = 2000;

const TRUNCATION_MARKER: &str = "... [truncated]";
const RELAY_BUFFER: usize = 16;

/// Which entry point produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Generate,
    GenerateStream,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Generate => write!(f, "Generate"),
            Operation::GenerateStream => write!(f, "GenerateStream"),
        }
    }
}

/// Telemetry for one logical call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    /// When the call (or the stream) completed
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub provider: String,
    pub model: String,
    pub operation: Operation,
    /// Rendered error, if the call failed
    pub error: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub request_payload: Option<String>,
    pub response_payload: Option<String>,
    pub trace_id: Option<String>,
}

impl LogEntry {
    fn new(operation: Operation, provider: String, model: String, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            duration,
            provider,
            model,
            operation,
            error: None,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            cost_usd: 0.0,
            request_payload: None,
            response_payload: None,
            trace_id: None,
        }
    }

    fn record_usage(&mut self, usage: &TokenUsage) {
        self.input_tokens = usage.input_tokens;
        self.output_tokens = usage.output_tokens;
        self.total_tokens = usage.total_tokens;
        self.cost_usd = usage.cost_usd;
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Destination for log entries
///
/// Invoked from background tasks, possibly concurrently.
#[async_trait::async_trait]
pub trait LogSink: Send + Sync {
    async fn log(&self, entry: LogEntry);
}

/// Sink that discards every entry
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

#[async_trait::async_trait]
impl LogSink for NoOpSink {
    async fn log(&self, _entry: LogEntry) {}
}

/// Sink that emits each entry as a structured `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait::async_trait]
impl LogSink for TracingSink {
    async fn log(&self, entry: LogEntry) {
        match &entry.error {
            Some(error) => log_warn!(
                target: "poly_llm::telemetry",
                entry_id = %entry.id,
                operation = %entry.operation,
                provider = %entry.provider,
                model = %entry.model,
                duration_ms = entry.duration.as_millis() as u64,
                trace_id = entry.trace_id.as_deref().unwrap_or(""),
                error = %error,
                "LLM call failed"
            ),
            None => log_info!(
                target: "poly_llm::telemetry",
                entry_id = %entry.id,
                operation = %entry.operation,
                provider = %entry.provider,
                model = %entry.model,
                duration_ms = entry.duration.as_millis() as u64,
                trace_id = entry.trace_id.as_deref().unwrap_or(""),
                input_tokens = entry.input_tokens,
                output_tokens = entry.output_tokens,
                total_tokens = entry.total_tokens,
                cost_usd = entry.cost_usd,
                request_payload = entry.request_payload.as_deref().unwrap_or(""),
                response_payload = entry.response_payload.as_deref().unwrap_or(""),
                "LLM call completed"
            ),
        }
    }
}

/// What the logging middleware records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// Include request and response text in entries
    pub log_payloads: bool,
    /// Suppress entries for successful calls
    pub log_errors_only: bool,
    /// Payload text beyond this many characters is cut and marked
    pub max_payload_chars: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_payloads: false,
            log_errors_only: false,
            max_payload_chars: DEFAULT_MAX_PAYLOAD_CHARS,
        }
    }
}

/// Cut `text` to `max_chars` characters, appending a marker when shortened
pub fn truncate_payload(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Provider decorator that emits one log entry per call
pub struct LoggingMiddleware<P> {
    inner: P,
    sink: Arc<dyn LogSink>,
    config: LogConfig,
}

impl<P> std::fmt::Debug for LoggingMiddleware<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingMiddleware")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: Provider> LoggingMiddleware<P> {
    pub fn new(inner: P, sink: Arc<dyn LogSink>, config: LogConfig) -> Self {
        Self {
            inner,
            sink,
            config,
        }
    }

    /// Wrap `inner` with a sink that discards everything
    pub fn without_sink(inner: P) -> Self {
        Self::new(inner, Arc::new(NoOpSink), LogConfig::default())
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn payload(&self, text: &str) -> Option<String> {
        self.config
            .log_payloads
            .then(|| truncate_payload(text, self.config.max_payload_chars))
    }

    fn emit(&self, entry: LogEntry) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            sink.log(entry).await;
        });
    }
}

#[async_trait::async_trait]
impl<P: Provider> Provider for LoggingMiddleware<P> {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        self.inner.configure(options)
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        let start = Instant::now();
        let result = self.inner.generate(ctx, request).await;
        let duration = start.elapsed();

        if self.config.log_errors_only && result.is_ok() {
            return result;
        }

        let model = match &result {
            Ok(response) if request.model.is_empty() => {
                response.model.clone().unwrap_or_default()
            }
            _ => request.model.clone(),
        };
        let mut entry = LogEntry::new(Operation::Generate, self.inner.name(), model, duration);
        entry.trace_id = ctx.trace_id().map(str::to_owned);
        entry.request_payload = self.payload(&request.summary());
        match &result {
            Ok(response) => {
                entry.record_usage(&response.usage);
                entry.response_payload = self.payload(&response.content);
            }
            Err(error) => entry.error = Some(error.to_string()),
        }

        self.emit(entry);
        result
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        let start = Instant::now();
        let provider = self.inner.name();
        let mut model = request.model.clone();
        let trace_id = ctx.trace_id().map(str::to_owned);
        let request_payload = self.payload(&request.summary());

        let mut source = match self.inner.generate_stream(ctx, request).await {
            Ok(source) => source,
            Err(error) => {
                let mut entry =
                    LogEntry::new(Operation::GenerateStream, provider, model, start.elapsed());
                entry.trace_id = trace_id;
                entry.request_payload = request_payload;
                entry.error = Some(error.to_string());
                self.emit(entry);
                return Err(error);
            }
        };

        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        let sink = Arc::clone(&self.sink);
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut content = String::new();
            let mut usage = None;
            let mut error = None;

            while let Some(packet) = source.next().await {
                match &packet {
                    StreamPacket::Chunk(text) => {
                        if config.log_payloads {
                            content.push_str(text);
                        }
                    }
                    StreamPacket::Usage {
                        usage: reported,
                        model: reported_model,
                    } => {
                        usage = Some(*reported);
                        if model.is_empty() {
                            model = reported_model.clone().unwrap_or_default();
                        }
                    }
                    StreamPacket::Error(failure) => {
                        error.get_or_insert_with(|| failure.to_string());
                    }
                }
                // Receiver dropped: the caller stopped listening
                if tx.send(packet).await.is_err() {
                    break;
                }
            }
            drop(tx);

            if config.log_errors_only && error.is_none() {
                return;
            }

            let mut entry =
                LogEntry::new(Operation::GenerateStream, provider, model, start.elapsed());
            entry.trace_id = trace_id;
            entry.request_payload = request_payload;
            entry.error = error;
            if let Some(usage) = usage {
                entry.record_usage(&usage);
            }
            if config.log_payloads {
                entry.response_payload =
                    Some(truncate_payload(&content, config.max_payload_chars));
            }
            sink.log(entry).await;
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}
