//! Core types for the provider pipeline
//!
//! ## Organization
//! - `messages` - Chat request and message types
//! - `context` - Request-scoped call metadata (trace id, cancellation)
//! - `provider` - The `Provider` trait, responses and stream packets

pub mod context;
pub mod messages;
pub mod provider;

pub use context::CallContext;
pub use messages::{ChatMessage, ChatRequest, ContentPart, MessageRole};
pub use provider::{ChatResponse, PacketStream, Provider, StreamPacket, TokenUsage};
