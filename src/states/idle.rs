use crate::events::Event;
use crate::memory::AgentMemory;
use crate::states::{emit, AgentContext, AgentState, OutputTx};
use crate::types::{AgentOutput, State};
use async_trait::async_trait;

pub struct IdleState;

#[async_trait]
impl AgentState for IdleState {
    fn name(&self) -> &'static str { "Idle" }

    async fn handle(
        &self,
        memory:    &mut AgentMemory,
        ctx:       &AgentContext,
        output_tx: OutputTx<'_>,
    ) -> Event {
        emit(output_tx, AgentOutput::StateStarted(State::idle()));

        if let Err(e) = memory.run_state.start() {
            tracing::warn!(error = %e, "run already started");
        }
        memory.log("Idle", "AGENT_STARTED", &format!(
            "task='{}' tools={} max_iterations={} adaptive_planning={}",
            memory.task, ctx.tools.len(), memory.config.max_iterations, memory.config.adaptive_planning
        ));

        if memory.config.adaptive_planning {
            Event::plan_requested()
        } else {
            Event::start()
        }
    }
}
