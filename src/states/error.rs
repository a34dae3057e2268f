use crate::events::Event;
use crate::memory::AgentMemory;
use crate::run_state::FailureReason;
use crate::states::{emit, AgentContext, AgentState, OutputTx};
use crate::types::{AgentOutput, State};
use async_trait::async_trait;

pub struct ErrorState;

#[async_trait]
impl AgentState for ErrorState {
    fn name(&self) -> &'static str { "Error" }

    async fn handle(
        &self,
        memory:    &mut AgentMemory,
        _ctx:      &AgentContext,
        output_tx: OutputTx<'_>,
    ) -> Event {
        emit(output_tx, AgentOutput::StateStarted(State::error()));

        let reason = memory.failure.clone().unwrap_or_else(|| FailureReason::Internal {
            message: "Unknown error".to_string(),
        });
        if let Err(e) = memory.run_state.fail(reason.clone()) {
            tracing::warn!(error = %e, "could not mark run failed");
        }

        let error_msg = reason.to_string();
        memory.log("Error", "AGENT_FAILED", &error_msg);
        tracing::error!(reason = %error_msg, "run failed");

        emit(output_tx, AgentOutput::Error(error_msg));
        Event::start()  // Never looked up: terminal states have no outgoing edges
    }
}
