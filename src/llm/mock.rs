use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use crate::llm::{LlmCaller, LlmResponse, Message};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

type Responder = Box<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<Result<LlmResponse, String>>>),
    Func(Responder),
}

/// Deterministic oracle for tests and demos.
///
/// Either replays a fixed script of responses/errors in order, or answers
/// through a closure that sees the rendered prompt (all message contents
/// joined by newlines).
pub struct MockLlmCaller {
    script:       Script,
    call_log:     Mutex<Vec<String>>,
    tool_calling: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockLlmCaller {
    /// Replay `responses` in order; errors once the script runs out.
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Replay successes and failures in order.
    pub fn scripted(script: Vec<Result<LlmResponse, String>>) -> Self {
        Self {
            script:       Script::Queue(Mutex::new(script.into())),
            call_log:     Mutex::new(Vec::new()),
            tool_calling: false,
        }
    }

    /// Convenience: a script of plain text replies.
    pub fn replies<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self::new(replies.into_iter().map(|r| LlmResponse::text(r)).collect())
    }

    /// Answer every call through `f(prompt)`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<String, String> + Send + Sync + 'static,
    {
        Self {
            script:       Script::Func(Box::new(f)),
            call_log:     Mutex::new(Vec::new()),
            tool_calling: false,
        }
    }

    /// Report native tool-call support, like a function-calling provider.
    pub fn with_tool_calling(mut self, yes: bool) -> Self {
        self.tool_calling = yes;
        self
    }

    /// Number of `generate` calls so far.
    pub fn call_count(&self) -> usize {
        lock(&self.call_log).len()
    }

    /// The prompt passed to the Nth call (0-indexed).
    pub fn prompt_for_call(&self, n: usize) -> Option<String> {
        lock(&self.call_log).get(n).cloned()
    }

    /// Number of calls whose prompt contains `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        lock(&self.call_log).iter().filter(|p| p.contains(needle)).count()
    }

    fn respond(&self, messages: &[Message]) -> Result<LlmResponse, String> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        lock(&self.call_log).push(prompt.clone());

        match &self.script {
            Script::Queue(queue) => lock(queue)
                .pop_front()
                .unwrap_or_else(|| Err("MockLlmCaller: no more programmed responses".to_string())),
            Script::Func(f) => f(&prompt).map(LlmResponse::text),
        }
    }
}

#[async_trait]
impl LlmCaller for MockLlmCaller {
    async fn generate(&self, messages: &[Message]) -> Result<LlmResponse, String> {
        self.respond(messages)
    }

    fn stream_generate<'a>(&'a self, messages: &'a [Message]) -> BoxStream<'a, Result<String, String>> {
        match self.respond(messages) {
            Ok(resp) => {
                let fragments: Vec<Result<String, String>> = resp
                    .content
                    .split_inclusive(' ')
                    .map(|s| Ok(s.to_string()))
                    .collect();
                stream::iter(fragments).boxed()
            }
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    fn supports_tool_calling(&self) -> bool {
        self.tool_calling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_replays_in_order_then_errors() {
        let mock = MockLlmCaller::scripted(vec![
            Err("429 too many requests".to_string()),
            Ok(LlmResponse::text("Final Answer: ok")),
        ]);
        let msgs = [Message::user("hi")];

        assert!(mock.generate(&msgs).await.is_err());
        assert_eq!(mock.generate(&msgs).await.unwrap().content, "Final Answer: ok");
        assert!(mock.generate(&msgs).await.is_err());
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.prompt_for_call(0).as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn stream_reassembles_content() {
        let mock = MockLlmCaller::replies(["Final Answer: four score"]);
        let msgs = [Message::user("q")];
        let parts: Vec<String> = mock
            .stream_generate(&msgs)
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert!(parts.len() > 1);
        assert_eq!(parts.concat(), "Final Answer: four score");
    }

    #[tokio::test]
    async fn closure_sees_prompt() {
        let mock = MockLlmCaller::from_fn(|prompt| Ok(format!("echo {}", prompt.len())));
        let resp = mock.generate(&[Message::user("abc")]).await.unwrap();
        assert_eq!(resp.content, "echo 3");
        assert_eq!(mock.calls_containing("abc"), 1);
    }
}
