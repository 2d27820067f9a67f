//! OpenAI provider implementation
//!
//! Speaks the chat-completions protocol (`POST {base_url}/v1/chat/completions`),
//! so it also serves OpenAI-compatible gateways through `base_url`. Every
//! request authenticates with a bearer API key.
//!
//! Streaming calls read server-sent events (`data: {...}` lines), ask the
//! backend for a final usage chunk via `stream_options.include_usage`, and end
//! at `data: [DONE]`.

use super::http::{build_client, send_request, spawn_line_relay, transport_error, LineOutcome};
use crate::config::{ProviderOptions, ProviderSettings, DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL};
use crate::core_types::{
    CallContext, ChatMessage, ChatRequest, ChatResponse, ContentPart, PacketStream, Provider,
    StreamPacket, TokenUsage,
};
use crate::error::{LlmError, LlmResult};
use crate::logging::log_debug;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROVIDER: &str = "OpenAI";
const SSE_DATA_PREFIX: &str = "data:";
const SSE_DONE: &str = "[DONE]";

/// OpenAI (and OpenAI-compatible) hosted provider
#[derive(Debug)]
pub struct OpenAIProvider {
    http: reqwest::Client,
    settings: RwLock<ProviderSettings>,
}

impl OpenAIProvider {
    /// Create a provider with `options` applied over the defaults
    /// (`https://api.openai.com`, `gpt-3.5-turbo`)
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigurationError`] if:
    /// - No API key is supplied
    /// - The HTTP client cannot be built
    pub fn with_options(options: &ProviderOptions) -> LlmResult<Self> {
        let mut settings = ProviderSettings::new(DEFAULT_OPENAI_URL, DEFAULT_OPENAI_MODEL);
        settings.apply(options);

        if settings.api_key.is_none() {
            return Err(LlmError::configuration_error("OpenAI API key is required"));
        }

        log_debug!(
            provider = "openai",
            base_url = %settings.base_url,
            model = %settings.model,
            timeout_secs = settings.timeout.as_secs(),
            "OpenAI provider initialized"
        );

        Ok(Self {
            http: build_client()?,
            settings: RwLock::new(settings),
        })
    }

    /// Snapshot of the settings currently in effect
    pub fn settings(&self) -> ProviderSettings {
        self.settings.read().clone()
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> LlmResult<PreparedRequest> {
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

        let body = OpenAIRequest {
            model,
            messages: request.messages.iter().map(OpenAIMessage::from).collect(),
            temperature,
            max_tokens: request.max_tokens.or(settings.max_tokens),
            stream,
            stream_options: stream.then_some(OpenAIStreamOptions {
                include_usage: true,
            }),
            response_format: request.json_mode.then_some(OpenAIResponseFormat {
                format_type: "json_object",
            }),
        };

        Ok(PreparedRequest {
            url: format!("{}/v1/chat/completions", settings.base_url),
            headers: build_auth_headers(settings.api_key.as_deref().unwrap_or_default())?,
            timeout: settings.timeout,
            body,
        })
    }

    async fn send(
        &self,
        ctx: &CallContext,
        prepared: &PreparedRequest,
    ) -> LlmResult<reqwest::Response> {
        log_debug!(
            provider = "openai",
            url = %prepared.url,
            model = %prepared.body.model,
            stream = prepared.body.stream,
            message_count = prepared.body.messages.len(),
            "Sending OpenAI chat request"
        );

        let request = self
            .http
            .post(&prepared.url)
            .headers(prepared.headers.clone())
            .timeout(prepared.timeout)
            .json(&prepared.body);
        send_request(ctx, PROVIDER, request).await
    }
}

struct PreparedRequest {
    url: String,
    headers: HeaderMap,
    timeout: Duration,
    body: OpenAIRequest,
}

/// Authentication headers for the chat-completions API
fn build_auth_headers(api_key: &str) -> LlmResult<HeaderMap> {
    let mut headers = HeaderMap::new();

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|e| LlmError::configuration_error(format!("Invalid API key format: {e}")))?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);

    Ok(headers)
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        let mut settings = self.settings.write();
        settings.apply(options);
        log_debug!(
            provider = "openai",
            base_url = %settings.base_url,
            model = %settings.model,
            "OpenAI provider reconfigured"
        );
        Ok(())
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        let prepared = self.build_request(request, false)?;
        let response = self.send(ctx, &prepared).await?;

        let reply: OpenAIResponse = tokio::select! {
            cancelled = ctx.done() => return Err(cancelled),
            result = response.json() => result.map_err(|e| {
                if e.is_timeout() {
                    transport_error(PROVIDER, e)
                } else {
                    LlmError::response_parsing_error(format!("Invalid OpenAI response: {e}"))
                }
            })?,
        };

        let Some(choice) = reply.choices.into_iter().next() else {
            return Err(LlmError::response_parsing_error("OpenAI returned no choices"));
        };

        Ok(ChatResponse {
            content: choice.message.and_then(|m| m.content).unwrap_or_default(),
            usage: reply.usage.map(TokenUsage::from).unwrap_or_default(),
            cached: false,
            model: reply.model.or(Some(prepared.body.model)),
        })
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        let prepared = self.build_request(request, true)?;
        let response = self.send(ctx, &prepared).await?;

        Ok(spawn_line_relay(response, ctx.clone(), PROVIDER, decode_event))
    }

    fn name(&self) -> String {
        format!("OpenAI ({})", self.settings.read().model)
    }
}

/// Decode one server-sent event line of a streamed completion
fn decode_event(line: &str, out: &mut Vec<StreamPacket>) -> LineOutcome {
    // Comments, event names and retry hints carry no data
    let Some(data) = line.strip_prefix(SSE_DATA_PREFIX) else {
        return LineOutcome::Continue;
    };
    let data = data.trim();
    if data == SSE_DONE {
        return LineOutcome::Finished;
    }

    let chunk: OpenAIResponse = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            let error =
                LlmError::response_parsing_error(format!("Invalid OpenAI stream event: {e}"));
            out.push(StreamPacket::Error(error));
            return LineOutcome::Finished;
        }
    };

    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty());
    if let Some(text) = text {
        out.push(StreamPacket::Chunk(text));
    }

    if let Some(usage) = chunk.usage {
        out.push(StreamPacket::Usage {
            usage: usage.into(),
            model: chunk.model,
        });
    }
    LineOutcome::Continue
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<OpenAIStreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<OpenAIResponseFormat>,
}

#[derive(Debug, Serialize)]
struct OpenAIStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: OpenAIContent,
}

/// Plain text, or typed parts once a message carries images
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAIImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAIImageUrl {
    url: String,
}

impl From<&ChatMessage> for OpenAIMessage {
    fn from(message: &ChatMessage) -> Self {
        let content = if message.image_urls().is_empty() {
            OpenAIContent::Text(message.text_content())
        } else {
            OpenAIContent::Parts(
                message
                    .content
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => {
                            OpenAIContentPart::Text { text: text.clone() }
                        }
                        ContentPart::ImageUrl { image_url } => OpenAIContentPart::ImageUrl {
                            image_url: OpenAIImageUrl {
                                url: image_url.clone(),
                            },
                        },
                    })
                    .collect(),
            )
        };

        Self {
            role: message.role.to_string(),
            content,
        }
    }
}

/// Unary completion, or one chunk of a streamed completion
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    #[serde(default)]
    message: Option<OpenAIResponseMessage>,
    #[serde(default)]
    delta: Option<OpenAIResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<OpenAIUsage> for TokenUsage {
    fn from(usage: OpenAIUsage) -> Self {
        TokenUsage::new(usage.prompt_tokens, usage.completion_tokens)
    }
}
