use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall,
        ChatCompletionRequestMessage,
        CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use crate::llm::{LlmCaller, LlmResponse, Message, TokenUsage};
use crate::types::ToolCall;
use std::collections::HashMap;

/// Oracle backed by the OpenAI chat API or any compatible endpoint.
pub struct OpenAiCaller {
    client: Client<OpenAIConfig>,
    model:  String,
}

impl OpenAiCaller {
    /// Standard OpenAI client using the OPENAI_API_KEY env var
    pub fn new(model: impl Into<String>) -> Self {
        Self { client: Client::new(), model: model.into() }
    }

    /// Custom base URL, for Groq, Together, Ollama, DeepSeek, etc.
    /// api_base example: "https://api.groq.com/openai/v1"
    pub fn with_base_url(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(api_base)
            .with_api_key(api_key);
        Self { client: Client::with_config(config), model: model.into() }
    }

    fn build_request(&self, messages: &[Message], streaming: bool) -> Result<CreateChatCompletionRequest, String> {
        // serde round-trip: our {role, content} pairs match the wire shape
        let value = serde_json::to_value(messages)
            .map_err(|e| format!("Failed to encode messages: {}", e))?;
        let messages: Vec<ChatCompletionRequestMessage> = serde_json::from_value(value)
            .map_err(|e| format!("Failed to build messages: {}", e))?;

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(self.model.clone()).messages(messages);
        if streaming {
            request_builder.stream(true);
        }
        request_builder.build()
            .map_err(|e| format!("Failed to build request: {}", e))
    }

    fn parse_tool_call(tc: &ChatCompletionMessageToolCall) -> ToolCall {
        let args: HashMap<String, serde_json::Value> =
            serde_json::from_str(&tc.function.arguments).unwrap_or_default();
        ToolCall {
            name: tc.function.name.clone(),
            args,
            id:   Some(tc.id.clone()),
        }
    }
}

#[async_trait]
impl LlmCaller for OpenAiCaller {
    async fn generate(&self, messages: &[Message]) -> Result<LlmResponse, String> {
        let request = self.build_request(messages, false)?;

        let response = self.client.chat()
            .create(request)
            .await
            .map_err(|e| format!("OpenAI API error: {}", e))?;

        let usage = response.usage.map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

        let choice = response.choices.into_iter().next()
            .ok_or("Empty response from OpenAI")?;
        let message = choice.message;

        let role = serde_json::to_value(&message.role)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "assistant".to_string());

        let tool_calls = message.tool_calls
            .map(|calls| calls.iter().map(Self::parse_tool_call).collect::<Vec<_>>())
            .filter(|calls| !calls.is_empty());

        Ok(LlmResponse {
            content: message.content.unwrap_or_default(),
            role,
            tool_calls,
            usage,
        })
    }

    fn stream_generate<'a>(&'a self, messages: &'a [Message]) -> BoxStream<'a, Result<String, String>> {
        let request = match self.build_request(messages, true) {
            Ok(r) => r,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        let client = self.client.clone();

        stream::once(async move {
            client.chat().create_stream(request).await
                .map_err(|e| format!("OpenAI API error: {}", e))
        })
        .flat_map(|res| match res {
            Ok(chunks) => chunks
                .filter_map(|chunk| async move {
                    match chunk {
                        Ok(resp) => resp.choices.into_iter().next()
                            .and_then(|c| c.delta.content)
                            .filter(|text| !text.is_empty())
                            .map(Ok),
                        Err(e) => Some(Err(format!("OpenAI stream error: {}", e))),
                    }
                })
                .boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        })
        .boxed()
    }

    fn supports_tool_calling(&self) -> bool {
        true
    }
}
