//! Backend adapters
//!
//! - **ollama**: local Ollama server via its native `/api/chat` endpoint
//! - **openai**: OpenAI or any OpenAI-compatible gateway via `/v1/chat/completions`
//! - **http**: request sending and streamed-body relay shared by both
//!
//! Adapters implement [`Provider`](crate::Provider) directly and know nothing
//! about the decorators wrapped around them.

mod http;
pub mod ollama;
pub mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
