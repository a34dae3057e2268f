use crate::types::ToolCall;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

#[cfg(feature = "openai")]
mod openai;
mod mock;

#[cfg(feature = "openai")]
pub use openai::OpenAiCaller;
pub use mock::MockLlmCaller;

/// One chat message sent to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role:    String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Token usage for a single oracle call or an entire run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens:  u32,
    pub output_tokens: u32,
    pub total_tokens:  u32,
}

impl TokenUsage {
    pub fn new(input: u32, output: u32) -> Self {
        Self {
            input_tokens:  input,
            output_tokens: output,
            total_tokens:  input + output,
        }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// What the oracle returns for one `generate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content:    String,
    pub role:       String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub usage:      Option<TokenUsage>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content:    content.into(),
            role:       "assistant".to_string(),
            tool_calls: None,
            usage:      None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(calls);
        self
    }
}

/// The single interface between the control loop and any oracle.
///
/// # Contract
/// - Must be Send + Sync (shared behind `Arc<dyn LlmCaller>`)
/// - Returns `Err(String)` for transport or provider failures; the loop
///   retries those with back-off, so the message should carry the status
///   (e.g. `"429 Too Many Requests"`) when there is one
/// - The free-text protocol lives in `content`; the loop does not depend
///   on native tool calling
#[async_trait]
pub trait LlmCaller: Send + Sync {
    async fn generate(&self, messages: &[Message]) -> Result<LlmResponse, String>;

    /// Finite, non-restartable stream of text fragments.
    fn stream_generate<'a>(&'a self, messages: &'a [Message]) -> BoxStream<'a, Result<String, String>>;

    fn supports_tool_calling(&self) -> bool {
        false
    }
}
