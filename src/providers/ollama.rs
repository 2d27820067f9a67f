//! Ollama provider implementation
//!
//! Talks to Ollama's native chat endpoint (`POST {base_url}/api/chat`).
//! Unary calls send `"stream": false` and read a single JSON object;
//! streaming calls read newline-delimited JSON objects until one reports
//! `"done": true`, which also carries the token counts.

use super::http::{build_client, send_request, spawn_line_relay, transport_error, LineOutcome};
use crate::config::{ProviderOptions, ProviderSettings};
use crate::core_types::{
    CallContext, ChatMessage, ChatRequest, ChatResponse, PacketStream, Provider, StreamPacket,
    TokenUsage,
};
use crate::error::{LlmError, LlmResult};
use crate::logging::log_debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROVIDER: &str = "Ollama";

/// Ollama local provider implementation
#[derive(Debug)]
pub struct OllamaProvider {
    http: reqwest::Client,
    settings: RwLock<ProviderSettings>,
}

impl OllamaProvider {
    /// Create a provider with default settings (`http://localhost:11434`, `llama3`)
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigurationError`] if the HTTP client cannot be built.
    pub fn new() -> LlmResult<Self> {
        Self::with_options(&ProviderOptions::default())
    }

    /// Create a provider with `options` applied over the defaults
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigurationError`] if the HTTP client cannot be built.
    pub fn with_options(options: &ProviderOptions) -> LlmResult<Self> {
        let http = build_client()?;

        let mut settings = ProviderSettings::default();
        settings.apply(options);

        log_debug!(
            provider = "ollama",
            base_url = %settings.base_url,
            model = %settings.model,
            timeout_secs = settings.timeout.as_secs(),
            "Ollama provider initialized"
        );

        Ok(Self {
            http,
            settings: RwLock::new(settings),
        })
    }

    /// Snapshot of the settings currently in effect
    pub fn settings(&self) -> ProviderSettings {
        self.settings.read().clone()
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> (String, Duration, OllamaChatRequest) {
        let settings = self.settings.read();

        let model = if request.model.trim().is_empty() {
            settings.model.clone()
        } else {
            request.model.clone()
        };
        let temperature = if request.temperature > 0.0 {
            request.temperature
        } else {
            settings.temperature
        };

        let body = OllamaChatRequest {
            model,
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream,
            format: request.json_mode.then_some("json"),
            options: OllamaOptions {
                temperature,
                num_predict: request.max_tokens.or(settings.max_tokens),
            },
        };

        (format!("{}/api/chat", settings.base_url), settings.timeout, body)
    }

    async fn send(
        &self,
        ctx: &CallContext,
        url: &str,
        timeout: Duration,
        body: &OllamaChatRequest,
    ) -> LlmResult<reqwest::Response> {
        log_debug!(
            provider = "ollama",
            url = %url,
            model = %body.model,
            stream = body.stream,
            message_count = body.messages.len(),
            "Sending Ollama chat request"
        );

        let request = self.http.post(url).timeout(timeout).json(body);
        send_request(ctx, PROVIDER, request).await
    }
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        let mut settings = self.settings.write();
        settings.apply(options);
        log_debug!(
            provider = "ollama",
            base_url = %settings.base_url,
            model = %settings.model,
            "Ollama provider reconfigured"
        );
        Ok(())
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        let (url, timeout, body) = self.build_request(request, false);
        let response = self.send(ctx, &url, timeout, &body).await?;

        let reply: OllamaChatResponse = tokio::select! {
            cancelled = ctx.done() => return Err(cancelled),
            result = response.json() => result.map_err(|e| {
                if e.is_timeout() {
                    transport_error(PROVIDER, e)
                } else {
                    LlmError::response_parsing_error(format!("Invalid Ollama response: {e}"))
                }
            })?,
        };

        if let Some(error) = reply.error {
            return Err(LlmError::request_failed(format!("Ollama error: {error}"), None));
        }

        Ok(ChatResponse {
            content: reply.message.map(|m| m.content).unwrap_or_default(),
            usage: TokenUsage::new(reply.prompt_eval_count, reply.eval_count),
            cached: false,
            model: reply.model.or(Some(body.model)),
        })
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        let (url, timeout, body) = self.build_request(request, true);
        let response = self.send(ctx, &url, timeout, &body).await?;

        Ok(spawn_line_relay(response, ctx.clone(), PROVIDER, decode_line))
    }

    fn name(&self) -> String {
        format!("Ollama Local ({})", self.settings.read().model)
    }
}

/// Decode one NDJSON line of a streamed chat reply
fn decode_line(line: &str, out: &mut Vec<StreamPacket>) -> LineOutcome {
    let chunk: OllamaChatResponse = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            let error =
                LlmError::response_parsing_error(format!("Invalid Ollama stream line: {e}"));
            out.push(StreamPacket::Error(error));
            return LineOutcome::Finished;
        }
    };

    if let Some(error) = chunk.error {
        let error = LlmError::request_failed(format!("Ollama error: {error}"), None);
        out.push(StreamPacket::Error(error));
        return LineOutcome::Finished;
    }

    if let Some(message) = chunk.message.filter(|m| !m.content.is_empty()) {
        out.push(StreamPacket::Chunk(message.content));
    }

    if chunk.done {
        out.push(StreamPacket::Usage {
            usage: TokenUsage::new(chunk.prompt_eval_count, chunk.eval_count),
            model: chunk.model,
        });
        return LineOutcome::Finished;
    }
    LineOutcome::Continue
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

impl From<&ChatMessage> for OllamaMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.text_content(),
            images: message.image_urls().into_iter().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaReply>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaReply {
    #[serde(default)]
    content: String,
}
