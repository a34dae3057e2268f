use crate::events::Event;
use crate::memory::AgentMemory;
use crate::run_state::HistoryEvent;
use crate::states::{emit, route_step, AgentContext, AgentState, OutputTx};
use crate::types::{AgentOutput, State};
use async_trait::async_trait;

pub struct ReflectingState;

#[async_trait]
impl AgentState for ReflectingState {
    fn name(&self) -> &'static str { "Reflecting" }

    async fn handle(
        &self,
        memory:    &mut AgentMemory,
        ctx:       &AgentContext,
        output_tx: OutputTx<'_>,
    ) -> Event {
        emit(output_tx, AgentOutput::StateStarted(State::reflecting()));

        let critique = ctx.reflector.critique(&memory.task, memory.run_state.history()).await;

        memory.log("Reflecting", "CRITIQUE", &format!(
            "is_progressing={} critique='{}'", critique.is_progressing, critique.critique
        ));
        memory.record(HistoryEvent::Reflection(critique.clone()));
        memory.push_scratch(&format!("\n{}\n", critique.scratch_line()));
        emit(output_tx, AgentOutput::Reflection(critique.clone()));

        if memory.config.adaptive_planning && !critique.is_progressing {
            memory.log("Reflecting", "STALLED", &critique.suggestion);
            return Event::stalled();
        }
        route_step("Reflecting", memory, output_tx)
    }
}
