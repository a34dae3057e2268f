use crate::dispatch::ToolDispatcher;
use crate::events::Event;
use crate::llm::LlmCaller;
use crate::memory::AgentMemory;
use crate::parser::ReasoningStep;
use crate::planner::Planner;
use crate::reflector::Reflector;
use crate::run_state::HistoryEvent;
use crate::tools::ToolRegistry;
use crate::types::AgentOutput;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

mod idle;
mod planning;
mod reasoning;
mod reflecting;
mod replanning;
mod acting;
mod observing;
mod done;
mod error;

pub use idle::IdleState;
pub use planning::PlanningState;
pub use reasoning::ReasoningState;
pub use reflecting::ReflectingState;
pub use replanning::ReplanningState;
pub use acting::ActingState;
pub use observing::ObservingState;
pub use done::DoneState;
pub use error::ErrorState;

pub type OutputTx<'a> = Option<&'a UnboundedSender<AgentOutput>>;

/// Collaborators shared by every state of one run. Read-only.
#[derive(Clone)]
pub struct AgentContext {
    pub llm:        Arc<dyn LlmCaller>,
    pub tools:      Arc<ToolRegistry>,
    pub planner:    Planner,
    pub reflector:  Reflector,
    pub dispatcher: ToolDispatcher,
}

/// The contract every state must fulfill.
///
/// # Implementing a State
///
/// 1. `handle()` performs the state's work using only `memory` and `ctx`.
/// 2. `handle()` MUST return an Event, never panic.
/// 3. Non-fatal failures (tool error, bad oracle output) are data: record
///    them in `memory` and return the matching Event.
/// 4. Always call `memory.log()` at least once per handle() call.
#[async_trait]
pub trait AgentState: Send + Sync {
    /// Returns the unique string name of this state.
    /// Must match the key used in the engine's handler map.
    fn name(&self) -> &'static str;

    /// Execute this state's logic. Returns the Event that drives
    /// the next transition lookup in the transition table.
    async fn handle(
        &self,
        memory:    &mut AgentMemory,
        ctx:       &AgentContext,
        output_tx: OutputTx<'_>,
    ) -> Event;
}

/// Best-effort send; a closed receiver is ignored.
pub(crate) fn emit(output_tx: OutputTx<'_>, output: AgentOutput) {
    if let Some(tx) = output_tx {
        let _ = tx.send(output);
    }
}

pub(crate) const NUDGE: &str = "Wait, I need to provide an Action or Final Answer.";

/// Route a parsed step: a final answer wins over an action, an action
/// goes to Acting, and anything else nudges the oracle and loops.
pub(crate) fn route_step(state: &str, memory: &mut AgentMemory, output_tx: OutputTx<'_>) -> Event {
    let step = memory.current_step.clone().unwrap_or_default();

    if let Some(answer) = step.final_answer {
        memory.log(state, "FINAL_ANSWER", &answer.chars().take(100).collect::<String>());
        if step.action.is_some() {
            tracing::debug!("final answer and action in one step, keeping the answer");
        }
        memory.final_answer = Some(answer);
        return Event::final_answer();
    }

    if let Some(action) = step.action {
        memory.log(state, "ACTION_REQUESTED", &action);
        memory.record(HistoryEvent::Action { tool: action.clone(), input: step.action_input });
        emit(output_tx, AgentOutput::Action(format!("Calling tool '{}'", action)));
        return Event::action_requested();
    }

    memory.log(state, "NO_ACTION", &step.thought.chars().take(100).collect::<String>());
    memory.push_scratch(&format!("\nThought: {}\n{}", step.thought, NUDGE));
    Event::no_action()
}

/// Scratch lines for one completed reason→act→observe cycle.
pub(crate) fn cycle_transcript(step: &ReasoningStep, observation: &str) -> String {
    let input = step
        .action_input
        .as_ref()
        .and_then(|i| serde_json::to_string(i).ok())
        .unwrap_or_else(|| "{}".to_string());
    format!(
        "\nThought: {}\nAction: {}\nAction Input: {}\nObservation: {}\n",
        step.thought,
        step.action.as_deref().unwrap_or_default(),
        input,
        observation
    )
}
