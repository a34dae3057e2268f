use crate::events::Event;
use crate::memory::AgentMemory;
use crate::states::{emit, AgentContext, AgentState, OutputTx};
use crate::types::{AgentOutput, State};
use async_trait::async_trait;

pub struct DoneState;

#[async_trait]
impl AgentState for DoneState {
    fn name(&self) -> &'static str { "Done" }

    async fn handle(
        &self,
        memory:    &mut AgentMemory,
        _ctx:      &AgentContext,
        output_tx: OutputTx<'_>,
    ) -> Event {
        emit(output_tx, AgentOutput::StateStarted(State::done()));

        let answer = memory.final_answer.clone().unwrap_or_default();
        if let Err(e) = memory.run_state.complete(answer.clone()) {
            tracing::warn!(error = %e, "could not mark run completed");
        }

        let truncated: String = answer.chars().take(100).collect();
        memory.log("Done", "TASK_COMPLETE", &truncated);
        tracing::info!(iterations = memory.iteration, "run completed");

        emit(output_tx, AgentOutput::FinalAnswer(answer));
        Event::start()  // Never looked up: terminal states have no outgoing edges
    }
}
