use crate::dispatch::ObservationKind;
use crate::llm::{Message, TokenUsage};
use crate::parser::ReasoningStep;
use crate::planner::Plan;
use crate::prompts;
use crate::run_state::{FailureReason, HistoryEvent, RunState};
use crate::states::{cycle_transcript, NUDGE};
use crate::tools::ToolRegistry;
use crate::trace::{Trace, TraceEntry};
use crate::types::AgentConfig;
use chrono::Utc;

/// Blackboard shared by the state handlers of one run.
#[derive(Debug)]
pub struct AgentMemory {
    // ── Task definition ──────────────────────────────────
    pub task:             String,
    /// Prepended to every reasoning call
    pub system_prompt:    String,

    // ── Run record ───────────────────────────────────────
    /// Status and append-only history; what checkpoints persist
    pub run_state:        RunState,

    // ── Loop state ───────────────────────────────────────
    /// Transcript of prior thoughts, actions and observations fed back to the oracle
    pub scratch:          String,
    /// Reasoning iterations started so far
    pub iteration:        usize,
    /// Set by Reasoning, consumed by Reflecting/Replanning/Acting/Observing
    pub current_step:     Option<ReasoningStep>,
    pub current_plan:     Plan,
    /// Set by Acting, consumed by Observing
    pub last_observation: Option<(String, ObservationKind)>,

    // ── Results ──────────────────────────────────────────
    pub final_answer:     Option<String>,
    /// Set when the run ends in Error
    pub failure:          Option<FailureReason>,

    // ── Configuration ────────────────────────────────────
    pub config:           AgentConfig,

    // ── Observability ────────────────────────────────────
    /// Summed over every oracle response that reported usage
    pub total_usage:      TokenUsage,
    pub trace:            Trace,
}

impl AgentMemory {
    pub fn new(task: impl Into<String>) -> Self {
        let task = task.into();
        Self {
            run_state:        RunState::new(task.clone()),
            task,
            system_prompt:    prompts::DEFAULT_SYSTEM_PROMPT.to_string(),
            scratch:          String::new(),
            iteration:        0,
            current_step:     None,
            current_plan:     Plan::default(),
            last_observation: None,
            final_answer:     None,
            failure:          None,
            config:           AgentConfig::default(),
            total_usage:      TokenUsage::default(),
            trace:            Trace::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Records an event into the trace log. Called by all state handlers.
    pub fn log(&mut self, state: &str, event: &str, data: &str) {
        tracing::debug!(state, event, data, iteration = self.iteration, "agent trace");
        self.trace.record(TraceEntry {
            iteration: self.iteration,
            state:     state.to_string(),
            event:     event.to_string(),
            data:      data.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn record(&mut self, event: HistoryEvent) {
        self.run_state.record(event);
    }

    /// Append to the scratch transcript, keeping only the configured tail.
    pub fn push_scratch(&mut self, text: &str) {
        self.scratch.push_str(text);
        if let Some(limit) = self.config.max_scratch_chars {
            let excess = self.scratch.chars().count().saturating_sub(limit);
            if excess > 0 {
                let cut = self
                    .scratch
                    .char_indices()
                    .nth(excess)
                    .map(|(i, _)| i)
                    .unwrap_or(self.scratch.len());
                self.scratch.drain(..cut);
            }
        }
    }

    /// Install a new plan and fold it into the scratch under `header`.
    pub fn install_plan(&mut self, plan: Plan, header: &str) {
        self.push_scratch(&format!("\n{}\n{}\n", header, plan.bullets()));
        self.current_plan = plan;
    }

    /// Adopt a restored run record and rebuild the loop state from its
    /// history: iteration count, plan and scratch transcript.
    pub fn resume_from(&mut self, run_state: RunState) {
        self.scratch.clear();
        self.iteration = 0;
        self.current_plan = Plan::default();
        self.current_step = None;
        self.last_observation = None;
        self.final_answer = run_state.answer().map(str::to_string);
        self.failure = run_state.failure().cloned();

        let mut pending: Option<ReasoningStep> = None;
        for entry in run_state.history() {
            match &entry.event {
                HistoryEvent::Thought(thought) => {
                    if let Some(prev) = pending.take() {
                        self.push_scratch(&format!("\nThought: {}\n{}", prev.thought, NUDGE));
                    }
                    self.iteration += 1;
                    pending = Some(ReasoningStep { thought: thought.clone(), ..Default::default() });
                }
                HistoryEvent::Action { tool, input } => {
                    if let Some(step) = pending.as_mut() {
                        step.action = Some(tool.clone());
                        step.action_input = input.clone();
                    }
                }
                HistoryEvent::Observation(observation) => {
                    if let Some(step) = pending.take() {
                        self.push_scratch(&cycle_transcript(&step, observation));
                    }
                }
                HistoryEvent::Reflection(c) => self.push_scratch(&format!("\n{}\n", c.scratch_line())),
                HistoryEvent::Plan(p) => self.install_plan(p.clone(), "Current Plan:"),
                HistoryEvent::PlanUpdate(p) => self.install_plan(p.clone(), "Updated Plan:"),
                HistoryEvent::System(_) => {}
            }
        }
        if let Some(prev) = pending.filter(|_| !run_state.status().is_terminal()) {
            if prev.action.is_some() {
                // Requested but not yet observed: Acting picks it up
                self.current_step = Some(prev);
            } else {
                self.push_scratch(&format!("\nThought: {}\n{}", prev.thought, NUDGE));
            }
        }

        self.task = run_state.task.clone();
        self.run_state = run_state;
    }

    /// System prompt plus the rendered reason→act prompt.
    pub fn build_messages(&self, tools: &ToolRegistry) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if !self.system_prompt.is_empty() {
            messages.push(Message::system(&self.system_prompt));
        }
        messages.push(Message::user(prompts::react_prompt(&self.task, tools, &self.scratch)));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_keeps_tail_when_bounded() {
        let mut memory = AgentMemory::new("t").with_config(AgentConfig {
            max_scratch_chars: Some(10),
            ..Default::default()
        });
        memory.push_scratch("0123456789");
        memory.push_scratch("abcdé");
        assert_eq!(memory.scratch, "56789abcdé");
    }

    #[test]
    fn scratch_is_unbounded_by_default() {
        let mut memory = AgentMemory::new("t");
        for _ in 0..100 {
            memory.push_scratch("Observation: 4\n");
        }
        assert_eq!(memory.scratch.len(), 1500);
    }

    #[test]
    fn messages_carry_task_and_scratch() {
        let mut memory = AgentMemory::new("What is 2+2?").with_system_prompt("sys");
        memory.push_scratch("\nThought: add");
        let msgs = memory.build_messages(&ToolRegistry::new());
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "system");
        assert!(msgs[1].content.contains("What is 2+2?"));
        assert!(msgs[1].content.contains("Thought: add"));
    }

    #[test]
    fn resume_rebuilds_scratch_and_iteration() {
        let mut run = RunState::new("What is 2+2?");
        run.start().unwrap();
        run.record(HistoryEvent::Thought("I should add".into()));
        run.record(HistoryEvent::Action {
            tool:  "calculator".into(),
            input: Some([("a".to_string(), serde_json::json!(2))].into()),
        });
        run.record(HistoryEvent::Observation("4".into()));
        run.record(HistoryEvent::Thought("hmm".into()));

        let mut memory = AgentMemory::new("other");
        memory.resume_from(run);

        assert_eq!(memory.task, "What is 2+2?");
        assert_eq!(memory.iteration, 2);
        assert!(memory.scratch.contains("\nThought: I should add\nAction: calculator\nAction Input: {\"a\":2}\nObservation: 4\n"));
        assert!(memory.scratch.ends_with("Thought: hmm\nWait, I need to provide an Action or Final Answer."));
    }

    #[test]
    fn resume_keeps_unobserved_action_pending() {
        let mut run = RunState::new("What is 2+2?");
        run.start().unwrap();
        run.record(HistoryEvent::Thought("I should add".into()));
        run.record(HistoryEvent::Action {
            tool:  "calculator".into(),
            input: Some([("a".to_string(), serde_json::json!(2))].into()),
        });

        let mut memory = AgentMemory::new("other");
        memory.resume_from(run);

        let step = memory.current_step.expect("pending action");
        assert_eq!(step.thought, "I should add");
        assert_eq!(step.action.as_deref(), Some("calculator"));
        assert_eq!(step.params().get("a"), Some(&serde_json::json!(2)));
        assert_eq!(memory.iteration, 1);
        assert!(!memory.scratch.contains(NUDGE));
    }

    #[test]
    fn install_plan_folds_bullets() {
        let mut memory = AgentMemory::new("t");
        let plan = Plan::from_response(r#"{"steps": [{"id": 1, "description": "look up"}]}"#);
        memory.install_plan(plan, "Current Plan:");
        assert_eq!(memory.scratch, "\nCurrent Plan:\n- look up\n");
        assert_eq!(memory.current_plan.steps.len(), 1);
    }
}
