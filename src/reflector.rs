use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::llm::{LlmCaller, Message};
use crate::parser::extract_json;
use crate::prompts;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::run_state::HistoryEntry;

/// The reflector's judgment of recent progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    #[serde(default = "progressing")]
    pub is_progressing: bool,
    #[serde(default)]
    pub critique:       String,
    #[serde(default)]
    pub suggestion:     String,
}

fn progressing() -> bool {
    true
}

impl Default for Critique {
    fn default() -> Self {
        Self {
            is_progressing: true,
            critique:       "Failed to parse critique.".to_string(),
            suggestion:     "Continue.".to_string(),
        }
    }
}

impl Critique {
    pub fn from_response(text: &str) -> Self {
        extract_json(text)
            .and_then(|v| serde_json::from_value::<Critique>(v).ok())
            .unwrap_or_default()
    }

    /// `Reflection: <critique> Suggestion: <suggestion>`
    pub fn scratch_line(&self) -> String {
        format!("Reflection: {} Suggestion: {}", self.critique, self.suggestion)
    }
}

#[derive(Clone)]
pub struct Reflector {
    llm:    Arc<dyn LlmCaller>,
    retry:  RetryPolicy,
    window: usize,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmCaller>, retry: RetryPolicy, window: usize) -> Self {
        Self { llm, retry, window }
    }

    /// Critique the last `window` history entries.
    pub async fn critique(&self, task: &str, history: &[HistoryEntry]) -> Critique {
        let start = history.len().saturating_sub(self.window);
        let messages = [Message::user(prompts::critique_prompt(task, &history[start..]))];

        match self.retry.attempt(|| self.llm.generate(&messages)).await {
            RetryOutcome::Succeeded { value, .. } => Critique::from_response(&value.content),
            RetryOutcome::Exhausted { last_error, .. } => {
                tracing::warn!(error = %last_error, "reflector oracle unavailable, assuming progress");
                Critique::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmCaller;
    use crate::run_state::{HistoryEvent, RunState};
    use std::time::Duration;

    #[test]
    fn unparseable_critique_is_optimistic() {
        let c = Critique::from_response("I think it's fine");
        assert!(c.is_progressing);
        assert_eq!(c.critique, "Failed to parse critique.");
        assert_eq!(c.suggestion, "Continue.");
    }

    #[test]
    fn missing_flag_defaults_to_progressing() {
        let c = Critique::from_response(r#"{"critique": "ok", "suggestion": "go"}"#);
        assert!(c.is_progressing);
        assert_eq!(c.scratch_line(), "Reflection: ok Suggestion: go");
    }

    #[tokio::test]
    async fn only_the_window_is_shown() {
        let mock = Arc::new(MockLlmCaller::replies([
            r#"```json
{"is_progressing": false, "critique": "looping", "suggestion": "stop"}
```"#,
        ]));
        let reflector = Reflector::new(mock.clone(), RetryPolicy::new(1, Duration::from_millis(1)), 5);
        let mut run = RunState::new("t");
        for i in 0..8 {
            run.record(HistoryEvent::Thought(format!("step-{}", i)));
        }

        let critique = reflector.critique("t", run.history()).await;

        assert!(!critique.is_progressing);
        let prompt = mock.prompt_for_call(0).unwrap();
        assert!(!prompt.contains("step-2"));
        assert!(prompt.contains("step-3"));
        assert!(prompt.contains("step-7"));
    }
}
