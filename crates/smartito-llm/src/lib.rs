//! Text-generation capability used by both analyst roles.
//!
//! The roles only see the [`LlmCapability`] trait. [`OpenAiCapability`]
//! talks to any OpenAI-compatible chat-completions endpoint;
//! [`ScriptedCapability`] replays queued replies for tests and offline runs.

pub mod error;
pub mod openai;
pub mod scripted;
pub mod types;

use async_trait::async_trait;

pub use error::LlmError;
pub use openai::OpenAiCapability;
pub use scripted::ScriptedCapability;
pub use types::{Message, Reply, ToolCall, ToolSpec};

/// Given messages and tools, produce a message or a tool call.
#[async_trait]
pub trait LlmCapability: Send + Sync {
    async fn respond(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Reply, LlmError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}
