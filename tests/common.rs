//! Test helper utilities for poly-llm integration tests
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use poly_llm::{ChatMessage, ChatRequest, OllamaProvider, OpenAIProvider, ProviderOptions};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::{MockServer, ResponseTemplate};

/// An address nothing listens on
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1";

/// Ollama provider pointed at the mock server
pub fn ollama_for(server: &MockServer) -> OllamaProvider {
    OllamaProvider::with_options(&ollama_options(&server.uri())).expect("provider should build")
}

pub fn ollama_options(base_url: &str) -> ProviderOptions {
    ProviderOptions::new()
        .with_base_url(base_url)
        .with_model("llama3")
        .with_timeout(Duration::from_secs(5))
}

pub fn user_request(model: &str, text: &str) -> ChatRequest {
    ChatRequest::new(model, vec![ChatMessage::user(text)])
}

/// Body of a non-streaming `/api/chat` reply
pub fn chat_reply(content: &str, prompt_tokens: u32, completion_tokens: u32) -> Value {
    json!({
        "model": "llama3",
        "created_at": "2024-06-01T12:00:00Z",
        "message": { "role": "assistant", "content": content },
        "done": true,
        "prompt_eval_count": prompt_tokens,
        "eval_count": completion_tokens
    })
}

pub fn chat_reply_template(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(chat_reply(content, 10, 5))
}

/// NDJSON stream body: one line per chunk, then a `done` line with usage
pub fn ndjson_stream(chunks: &[&str], prompt_tokens: u32, completion_tokens: u32) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let line = json!({
            "model": "llama3",
            "message": { "role": "assistant", "content": chunk },
            "done": false
        });
        body.push_str(&line.to_string());
        body.push('\n');
    }
    let last = json!({
        "model": "llama3",
        "message": { "role": "assistant", "content": "" },
        "done": true,
        "prompt_eval_count": prompt_tokens,
        "eval_count": completion_tokens
    });
    body.push_str(&last.to_string());
    body.push('\n');
    body
}

pub fn error_template(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({ "error": message }))
}

/// API key the OpenAI mocks expect as a bearer token
pub const TEST_API_KEY: &str = "sk-test";

/// OpenAI provider pointed at the mock server
pub fn openai_for(server: &MockServer) -> OpenAIProvider {
    OpenAIProvider::with_options(&openai_options(&server.uri())).expect("provider should build")
}

pub fn openai_options(base_url: &str) -> ProviderOptions {
    ProviderOptions::new()
        .with_api_key(TEST_API_KEY)
        .with_base_url(base_url)
        .with_model("gpt-4o")
        .with_timeout(Duration::from_secs(5))
}

/// Body of a non-streaming `/v1/chat/completions` reply
pub fn completion_reply(content: &str, prompt_tokens: u32, completion_tokens: u32) -> Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1_717_243_200,
        "model": "gpt-4o-2024-05-13",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    })
}

/// Server-sent event body: one delta per chunk, a usage chunk, then `[DONE]`
pub fn sse_stream(chunks: &[&str], prompt_tokens: u32, completion_tokens: u32) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let event = json!({
            "model": "gpt-4o-2024-05-13",
            "choices": [{ "index": 0, "delta": { "content": chunk } }]
        });
        body.push_str(&format!("data: {event}\n\n"));
    }
    let usage = json!({
        "model": "gpt-4o-2024-05-13",
        "choices": [],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    });
    body.push_str(&format!("data: {usage}\n\n"));
    body.push_str("data: [DONE]\n\n");
    body
}
