use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::llm::{LlmCaller, Message};
use crate::parser::extract_json;
use crate::prompts;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub id:           u32,
    #[serde(alias = "task")]
    pub description:  String,
    #[serde(default)]
    pub tool:         Option<String>,
    #[serde(default)]
    pub dependencies: Vec<u32>,
}

/// Ordered step list. Replaced wholesale on replan, never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Decode a plan from free text. Anything unusable yields an empty plan.
    pub fn from_response(text: &str) -> Self {
        extract_json(text)
            .and_then(|v| serde_json::from_value::<Plan>(v).ok())
            .unwrap_or_default()
    }

    /// `- <description>` per step, as folded into the scratch transcript.
    pub fn bullets(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("- {}", s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn numbered(&self) -> String {
        if self.steps.is_empty() {
            return "(empty)".to_string();
        }
        self.steps
            .iter()
            .map(|s| match &s.tool {
                Some(tool) => format!("{}. {} (tool: {})", s.id, s.description, tool),
                None => format!("{}. {}", s.id, s.description),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Turns a task into a [`Plan`] with one oracle call, and rebuilds it on feedback.
#[derive(Clone)]
pub struct Planner {
    llm:   Arc<dyn LlmCaller>,
    retry: RetryPolicy,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmCaller>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    pub async fn create_plan(&self, task: &str, tools: &ToolRegistry) -> Plan {
        self.ask(prompts::plan_prompt(task, tools)).await
    }

    pub async fn replan(&self, current: &Plan, execution_summary: &str, feedback: &str) -> Plan {
        self.ask(prompts::replan_prompt(current, execution_summary, feedback)).await
    }

    async fn ask(&self, prompt: String) -> Plan {
        let messages = [Message::user(prompt)];
        match self.retry.attempt(|| self.llm.generate(&messages)).await {
            RetryOutcome::Succeeded { value, .. } => {
                let plan = Plan::from_response(&value.content);
                if plan.is_empty() {
                    tracing::warn!("planner response had no usable steps");
                }
                plan
            }
            RetryOutcome::Exhausted { last_error, .. } => {
                tracing::warn!(error = %last_error, "planner oracle unavailable, continuing without a plan");
                Plan::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmCaller;
    use std::time::Duration;

    fn fast() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1))
    }

    #[test]
    fn accepts_task_alias_and_missing_fields() {
        let plan = Plan::from_response(
            r#"Sure! {"steps": [{"id": 1, "task": "search"}, {"id": 2, "description": "sum", "tool": "calc", "dependencies": [1]}]}"#,
        );
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].description, "search");
        assert_eq!(plan.steps[1].dependencies, vec![1]);
        assert_eq!(plan.bullets(), "- search\n- sum");
    }

    #[test]
    fn garbage_is_an_empty_plan() {
        assert!(Plan::from_response("no json here").is_empty());
        assert!(Plan::from_response(r#"{"steps": "nope"}"#).is_empty());
    }

    #[tokio::test]
    async fn replan_sends_current_plan_and_feedback() {
        let mock = Arc::new(MockLlmCaller::replies([r#"{"steps": [{"id": 1, "description": "retry"}]}"#]));
        let planner = Planner::new(mock.clone(), fast());
        let current = Plan::from_response(r#"{"steps": [{"id": 1, "description": "old step"}]}"#);

        let plan = planner.replan(&current, "Progress stalled: looping", "try another tool").await;

        assert_eq!(plan.steps[0].description, "retry");
        let prompt = mock.prompt_for_call(0).unwrap();
        assert!(prompt.contains("1. old step"));
        assert!(prompt.contains("try another tool"));
    }

    #[tokio::test]
    async fn oracle_outage_degrades_to_empty_plan() {
        let mock = Arc::new(MockLlmCaller::replies(Vec::<String>::new()));
        let planner = Planner::new(mock.clone(), fast());
        let plan = planner.create_plan("task", &ToolRegistry::new()).await;
        assert!(plan.is_empty());
        assert_eq!(mock.call_count(), 2);
    }
}
