use crate::events::Event;
use crate::memory::AgentMemory;
use crate::run_state::HistoryEvent;
use crate::states::{emit, AgentContext, AgentState, OutputTx};
use crate::types::{AgentOutput, State};
use async_trait::async_trait;

/// Builds the initial plan before the first reasoning call.
pub struct PlanningState;

#[async_trait]
impl AgentState for PlanningState {
    fn name(&self) -> &'static str { "Planning" }

    async fn handle(
        &self,
        memory:    &mut AgentMemory,
        ctx:       &AgentContext,
        output_tx: OutputTx<'_>,
    ) -> Event {
        emit(output_tx, AgentOutput::StateStarted(State::planning()));

        memory.record(HistoryEvent::System("Creating initial plan...".to_string()));
        let plan = ctx.planner.create_plan(&memory.task, &ctx.tools).await;

        memory.log("Planning", "PLAN_CREATED", &format!("steps={}", plan.steps.len()));
        memory.record(HistoryEvent::Plan(plan.clone()));
        emit(output_tx, AgentOutput::PlanUpdated(plan.clone()));
        memory.install_plan(plan, "Current Plan:");

        Event::plan_ready()
    }
}
