//! Test helper utilities for poly-llm unit tests
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use crate::config::ProviderOptions;
use crate::core_types::{
    CallContext, ChatMessage, ChatRequest, ChatResponse, PacketStream, Provider, StreamPacket,
    TokenUsage,
};
use crate::error::{LlmError, LlmResult};
use crate::middleware::{LogEntry, LogSink};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Backend double with scripted behavior
///
/// Fails the first `failures` unary calls (or every call when
/// `always_fail`), then answers with `content`. Records every call's trace
/// id and every `configure` call.
pub struct ScriptedProvider {
    name: String,
    content: String,
    usage: TokenUsage,
    model: Option<String>,
    remaining_failures: AtomicU32,
    always_fail: bool,
    delay: Option<Duration>,
    stream_chunks: Vec<String>,
    stream_usage: Option<TokenUsage>,
    stream_error: Option<String>,
    stream_setup_fails: bool,
    calls: AtomicU32,
    stream_calls: AtomicU32,
    trace_ids: Mutex<Vec<Option<String>>>,
    configured: Mutex<Vec<ProviderOptions>>,
}

impl ScriptedProvider {
    pub fn succeeding(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            content: content.to_string(),
            usage: TokenUsage::new(10, 5),
            model: None,
            remaining_failures: AtomicU32::new(0),
            always_fail: false,
            delay: None,
            stream_chunks: Vec::new(),
            stream_usage: None,
            stream_error: None,
            stream_setup_fails: false,
            calls: AtomicU32::new(0),
            stream_calls: AtomicU32::new(0),
            trace_ids: Mutex::new(Vec::new()),
            configured: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            always_fail: true,
            ..Self::succeeding(name, "")
        }
    }

    pub fn failing_first(self, failures: u32) -> Self {
        self.remaining_failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_stream(mut self, chunks: &[&str], usage: Option<TokenUsage>) -> Self {
        self.stream_chunks = chunks.iter().map(|c| c.to_string()).collect();
        self.stream_usage = usage;
        self
    }

    pub fn with_stream_error(mut self, message: &str) -> Self {
        self.stream_error = Some(message.to_string());
        self
    }

    pub fn with_stream_setup_failure(mut self) -> Self {
        self.stream_setup_fails = true;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> u32 {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn trace_ids(&self) -> Vec<Option<String>> {
        self.trace_ids.lock().clone()
    }

    pub fn configured(&self) -> Vec<ProviderOptions> {
        self.configured.lock().clone()
    }

    fn scripted_failure(&self) -> LlmError {
        LlmError::request_failed(format!("{} scripted failure", self.name), Some(503))
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        self.configured.lock().push(options.clone());
        Ok(())
    }

    async fn generate(&self, ctx: &CallContext, _request: &ChatRequest) -> LlmResult<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.trace_ids.lock().push(ctx.trace_id().map(str::to_owned));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.always_fail {
            return Err(self.scripted_failure());
        }
        let consumed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(self.scripted_failure());
        }

        Ok(ChatResponse {
            content: self.content.clone(),
            usage: self.usage,
            cached: false,
            model: self.model.clone(),
        })
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        _request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.trace_ids.lock().push(ctx.trace_id().map(str::to_owned));

        if self.stream_setup_fails {
            return Err(LlmError::provider_down(
                format!("{} stream unavailable", self.name),
                None,
            ));
        }

        let mut packets: Vec<StreamPacket> = self
            .stream_chunks
            .iter()
            .cloned()
            .map(StreamPacket::Chunk)
            .collect();
        if let Some(message) = &self.stream_error {
            packets.push(StreamPacket::Error(LlmError::response_parsing_error(
                message.clone(),
            )));
        }
        if let Some(usage) = self.stream_usage {
            packets.push(StreamPacket::Usage {
                usage,
                model: self.model.clone(),
            });
        }
        Ok(futures_util::stream::iter(packets).boxed())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Sink that forwards every entry to a channel the test can read
pub struct CapturingSink {
    tx: mpsc::UnboundedSender<LogEntry>,
}

#[async_trait::async_trait]
impl LogSink for CapturingSink {
    async fn log(&self, entry: LogEntry) {
        let _ = self.tx.send(entry);
    }
}

pub fn capturing_sink() -> (Arc<CapturingSink>, mpsc::UnboundedReceiver<LogEntry>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(CapturingSink { tx }), rx)
}

/// Wait for the next log entry, failing the test if none arrives
pub async fn next_entry(rx: &mut mpsc::UnboundedReceiver<LogEntry>) -> LogEntry {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("log entry should arrive")
        .expect("sink channel should stay open")
}

/// Drain a packet stream into a vector
pub async fn collect_packets(stream: PacketStream) -> Vec<StreamPacket> {
    stream.collect().await
}

pub fn create_test_request(model: &str) -> ChatRequest {
    ChatRequest::new(model, vec![ChatMessage::user("Hello")])
}

mockall::mock! {
    pub Backend {}

    #[async_trait::async_trait]
    impl Provider for Backend {
        fn configure(&self, options: &ProviderOptions) -> LlmResult<()>;
        async fn generate(
            &self,
            ctx: &CallContext,
            request: &ChatRequest,
        ) -> LlmResult<ChatResponse>;
        async fn generate_stream(
            &self,
            ctx: &CallContext,
            request: &ChatRequest,
        ) -> LlmResult<PacketStream>;
        fn name(&self) -> String;
    }
}
