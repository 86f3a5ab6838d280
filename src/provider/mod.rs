//! Completion provider abstraction and the OpenAI-compatible implementation.

pub mod http;
mod openai_compatible;

pub use openai_compatible::OpenAiCompatibleProvider;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Message, ToolDefinition};

/// One chat-completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// One completion choice, already mapped onto internal message types.
#[derive(Debug, Clone)]
pub struct Choice {
    pub finish_reason: String,
    pub message: Message,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub choices: Vec<Choice>,
}

/// Seam between the turn runner and a concrete completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
