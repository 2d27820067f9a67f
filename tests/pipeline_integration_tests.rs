//! Integration Tests for assembled provider pipelines
//!
//! UNIT UNDER TEST: PipelineBuilder, FallbackClient and generate_struct over a live HTTP backend
//!
//! BUSINESS RESPONSIBILITY:
//!   - Wire the full decorator chain around the Ollama adapter
//!   - Recover from transient backend failures without caller involvement
//!   - Shield a persistently failing backend behind the circuit breaker
//!   - Price, log and correlate every logical call
//!   - Produce typed values from model replies
//!
//! TEST COVERAGE:
//!   - Transient 503s absorbed by retries, one log entry per call
//!   - Breaker opening after exhausted retry sequences
//!   - Cost annotation for priced models
//!   - Structured output through the pipeline
//!   - Failover from an unreachable primary

mod common;

use common::{chat_reply_template, error_template, ollama_options, user_request, UNREACHABLE_URL};
use poly_llm::{
    create_provider, generate_struct, BreakerPolicy, CallContext, FallbackClient, LlmError,
    LogConfig, LogEntry, LogSink, PipelineBuilder, PipelineConfig, Provider, RetryPolicy,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

struct ChannelSink(mpsc::UnboundedSender<LogEntry>);

#[async_trait::async_trait]
impl LogSink for ChannelSink {
    async fn log(&self, entry: LogEntry) {
        let _ = self.0.send(entry);
    }
}

fn pipeline_config(base_url: &str) -> PipelineConfig {
    PipelineConfig {
        options: ollama_options(base_url),
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        logging: LogConfig {
            log_payloads: true,
            ..LogConfig::default()
        },
        ..PipelineConfig::new("ollama")
    }
}

async fn next_entry(rx: &mut mpsc::UnboundedReceiver<LogEntry>) -> LogEntry {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("log entry should arrive")
        .expect("sink channel should stay open")
}

#[tokio::test]
async fn test_pipeline_absorbs_transient_failures() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(error_template(503, "loading model"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply_template("Recovered"))
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = PipelineBuilder::new(pipeline_config(&server.uri()))
        .with_sink(Arc::new(ChannelSink(tx)))
        .build()
        .expect("pipeline should build");

    // Act
    let response = pipeline
        .generate(&CallContext::new(), &user_request("llama3", "Hello"))
        .await
        .expect("retries should absorb the 503s");
    let entry = next_entry(&mut rx).await;
    let requests = server.received_requests().await.expect("recording enabled");

    // Assert
    assert_eq!(response.content, "Recovered");
    assert_eq!(requests.len(), 3);
    assert!(!entry.is_error());
    assert_eq!(entry.total_tokens, 15);
    assert!(entry.trace_id.is_some(), "Pipeline assigns a trace id");
    assert_eq!(entry.request_payload.as_deref(), Some("user: Hello"));
    assert_eq!(entry.response_payload.as_deref(), Some("Recovered"));
    let extra = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(extra.is_err(), "Retries inside one call produce one entry");
}

#[tokio::test]
async fn test_pipeline_breaker_opens_after_exhausted_retries() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(error_template(500, "broken"))
        .expect(4)
        .mount(&server)
        .await;

    let config = PipelineConfig {
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
        },
        breaker: BreakerPolicy {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(60),
        },
        ..pipeline_config(&server.uri())
    };
    let pipeline = PipelineBuilder::new(config)
        .with_sink(Arc::new(poly_llm::NoOpSink))
        .build()
        .expect("pipeline should build");
    let request = user_request("llama3", "Hello");

    // Act
    let first = pipeline.generate(&CallContext::new(), &request).await;
    let second = pipeline.generate(&CallContext::new(), &request).await;
    let third = pipeline.generate(&CallContext::new(), &request).await;

    // Assert (server verifies exactly four requests on drop)
    assert!(matches!(first, Err(LlmError::RetriesExhausted { attempts: 2, .. })));
    assert!(matches!(second, Err(LlmError::RetriesExhausted { attempts: 2, .. })));
    assert!(matches!(third, Err(LlmError::CircuitOpen { .. })), "got {third:?}");
}

#[tokio::test]
async fn test_pipeline_prices_known_models() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply_template("ok"))
        .mount(&server)
        .await;
    let pipeline = PipelineBuilder::new(pipeline_config(&server.uri()))
        .with_sink(Arc::new(poly_llm::NoOpSink))
        .build()
        .expect("pipeline should build");

    // Act
    let priced = pipeline
        .generate(&CallContext::new(), &user_request("gpt-4o", "Hi"))
        .await
        .expect("call should succeed");
    let local = pipeline
        .generate(&CallContext::new(), &user_request("llama3", "Hi"))
        .await
        .expect("call should succeed");

    // Assert
    let expected = 10.0 / 1e6 * 5.0 + 5.0 / 1e6 * 15.0;
    assert!((priced.usage.cost_usd - expected).abs() < 1e-12);
    assert_eq!(local.usage.cost_usd, 0.0);
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct Person {
    /// Full name
    name: String,
    age: u32,
}

#[tokio::test]
async fn test_structured_output_through_pipeline() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply_template(
            "Sure!\n```json\n{\"name\": \"Ada Lovelace\", \"age\": 36}\n```",
        ))
        .mount(&server)
        .await;
    let pipeline = PipelineBuilder::new(pipeline_config(&server.uri()))
        .with_sink(Arc::new(poly_llm::NoOpSink))
        .build()
        .expect("pipeline should build");

    // Act
    let person: Person = generate_struct(
        pipeline.as_ref(),
        &CallContext::new(),
        &user_request("llama3", "Describe Ada Lovelace"),
    )
    .await
    .expect("reply should parse");
    let requests = server.received_requests().await.expect("recording enabled");
    let body: serde_json::Value = requests[0].body_json().expect("JSON body");

    // Assert
    assert_eq!(
        person,
        Person {
            name: "Ada Lovelace".to_string(),
            age: 36
        }
    );
    assert_eq!(body["format"], "json");
    assert_eq!(body["messages"][0]["role"], "system");
    assert!(body["messages"][0]["content"]
        .as_str()
        .is_some_and(|c| c.contains("Full name")));
    assert_eq!(body["messages"][1]["content"], "Describe Ada Lovelace");
}

#[tokio::test]
async fn test_fallback_from_unreachable_primary() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply_template("from secondary"))
        .expect(1)
        .mount(&server)
        .await;
    let primary = create_provider("ollama", &ollama_options(UNREACHABLE_URL))
        .expect("primary should build");
    let secondary =
        create_provider("ollama", &ollama_options(&server.uri())).expect("secondary should build");
    let client = FallbackClient::new(primary, secondary);

    // Act
    let response = client
        .generate(&CallContext::new(), &user_request("llama3", "Hi"))
        .await
        .expect("secondary should answer");

    // Assert
    assert_eq!(response.content, "from secondary");
}
