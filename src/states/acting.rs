use crate::dispatch::{not_found_observation, ObservationKind};
use crate::events::Event;
use crate::memory::AgentMemory;
use crate::run_state::FailureReason;
use crate::states::{emit, AgentContext, AgentState, OutputTx};
use crate::types::{AgentOutput, State};
use async_trait::async_trait;

pub struct ActingState;

#[async_trait]
impl AgentState for ActingState {
    fn name(&self) -> &'static str { "Acting" }

    async fn handle(
        &self,
        memory:    &mut AgentMemory,
        ctx:       &AgentContext,
        output_tx: OutputTx<'_>,
    ) -> Event {
        emit(output_tx, AgentOutput::StateStarted(State::acting()));

        // Extract the requested action from the current step
        let Some((name, params)) = memory
            .current_step
            .as_ref()
            .and_then(|s| s.action.clone().map(|a| (a, s.params())))
        else {
            memory.log("Acting", "FATAL_ERROR", "No action in current step");
            memory.failure = Some(FailureReason::Internal {
                message: "Acting entered without a requested action".to_string(),
            });
            return Event::fatal_error();
        };

        memory.log("Acting", "TOOL_EXECUTE", &format!("tool='{}' args={:?}", name, params));
        emit(output_tx, AgentOutput::ToolCallStarted { name: name.clone(), args: params.clone() });

        let (observation, kind) = match ctx.tools.get(&name) {
            None => (not_found_observation(&name), ObservationKind::NotFound),
            Some(tool) => {
                let outcome = ctx.dispatcher.execute(tool.as_ref(), &params).await;
                (outcome.observation(), outcome.kind())
            }
        };

        memory.log("Acting", match kind {
            ObservationKind::Success  => "TOOL_SUCCESS",
            ObservationKind::Failure  => "TOOL_FAILURE",
            ObservationKind::NotFound => "TOOL_NOT_FOUND",
            ObservationKind::PolicyDenied | ObservationKind::UserDenied => "TOOL_DENIED",
        }, &observation.chars().take(100).collect::<String>());

        emit(output_tx, AgentOutput::ToolCallFinished {
            name,
            observation: observation.clone(),
            kind,
        });
        memory.last_observation = Some((observation, kind));

        match kind {
            ObservationKind::Success  => Event::tool_success(),
            ObservationKind::Failure  => Event::tool_failure(),
            ObservationKind::NotFound => Event::tool_not_found(),
            ObservationKind::PolicyDenied | ObservationKind::UserDenied => Event::tool_denied(),
        }
    }
}
