use crate::events::Event;
use crate::memory::AgentMemory;
use crate::run_state::HistoryEvent;
use crate::states::{emit, route_step, AgentContext, AgentState, OutputTx};
use crate::types::{AgentOutput, State};
use async_trait::async_trait;

/// Rebuilds the plan after reflection reports a stall, then routes the
/// step that triggered the reflection.
pub struct ReplanningState;

#[async_trait]
impl AgentState for ReplanningState {
    fn name(&self) -> &'static str { "Replanning" }

    async fn handle(
        &self,
        memory:    &mut AgentMemory,
        ctx:       &AgentContext,
        output_tx: OutputTx<'_>,
    ) -> Event {
        emit(output_tx, AgentOutput::StateStarted(State::replanning()));

        let (summary, feedback) = match memory.run_state.history().iter().rev().find_map(|e| match &e.event {
            HistoryEvent::Reflection(c) => Some(c.clone()),
            _ => None,
        }) {
            Some(c) => (format!("Stalled progress: {}", c.critique), c.suggestion),
            None => ("Stalled progress".to_string(), String::new()),
        };

        memory.record(HistoryEvent::System("Progress stalled. Replanning...".to_string()));
        let plan = ctx.planner.replan(&memory.current_plan, &summary, &feedback).await;

        memory.log("Replanning", "PLAN_UPDATED", &format!("steps={}", plan.steps.len()));
        memory.record(HistoryEvent::PlanUpdate(plan.clone()));
        emit(output_tx, AgentOutput::PlanUpdated(plan.clone()));
        memory.install_plan(plan, "Updated Plan:");

        route_step("Replanning", memory, output_tx)
    }
}
