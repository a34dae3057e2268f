use crate::events::Event;
use crate::memory::AgentMemory;
use crate::run_state::HistoryEvent;
use crate::states::{cycle_transcript, emit, AgentContext, AgentState, OutputTx};
use crate::types::{AgentOutput, State};
use async_trait::async_trait;

pub struct ObservingState;

#[async_trait]
impl AgentState for ObservingState {
    fn name(&self) -> &'static str { "Observing" }

    async fn handle(
        &self,
        memory:    &mut AgentMemory,
        _ctx:      &AgentContext,
        output_tx: OutputTx<'_>,
    ) -> Event {
        emit(output_tx, AgentOutput::StateStarted(State::observing()));

        // Commit the observation and fold the whole cycle into the scratch
        let (observation, kind) = memory
            .last_observation
            .take()
            .unwrap_or_else(|| (String::new(), crate::dispatch::ObservationKind::Failure));
        memory.record(HistoryEvent::Observation(observation.clone()));

        if let Some(step) = memory.current_step.take() {
            let transcript = cycle_transcript(&step, &observation);
            memory.push_scratch(&transcript);
        }

        memory.log("Observing", "HISTORY_COMMIT", &format!(
            "kind={:?} history_len={}", kind, memory.run_state.history().len()
        ));
        Event::r#continue()
    }
}
