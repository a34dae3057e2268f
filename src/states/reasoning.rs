use crate::events::Event;
use crate::llm::{LlmCaller, LlmResponse, Message};
use crate::memory::AgentMemory;
use crate::parser;
use crate::retry::RetryOutcome;
use crate::run_state::{FailureReason, HistoryEvent};
use crate::states::{emit, route_step, AgentContext, AgentState, OutputTx};
use crate::types::{AgentOutput, State};
use async_trait::async_trait;
use futures::StreamExt;

/// One oracle call per iteration: render, call under retry, parse.
pub struct ReasoningState;

impl ReasoningState {
    /// Plain `generate`, or token-by-token when someone is listening.
    ///
    /// Tool-calling oracles always use `generate`: native calls never
    /// arrive through the text stream.
    async fn call_oracle(
        llm:       &dyn LlmCaller,
        messages:  &[Message],
        output_tx: OutputTx<'_>,
    ) -> Result<LlmResponse, String> {
        let tx = match output_tx {
            None => return llm.generate(messages).await,
            Some(tx) if llm.supports_tool_calling() => {
                let response = llm.generate(messages).await?;
                if !response.content.is_empty() {
                    let _ = tx.send(AgentOutput::LlmToken(response.content.clone()));
                }
                return Ok(response);
            }
            Some(tx) => tx,
        };

        let mut stream = llm.stream_generate(messages);
        let mut content = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            let _ = tx.send(AgentOutput::LlmToken(fragment.clone()));
            content.push_str(&fragment);
        }
        Ok(LlmResponse::text(content))
    }
}

#[async_trait]
impl AgentState for ReasoningState {
    fn name(&self) -> &'static str { "Reasoning" }

    async fn handle(
        &self,
        memory:    &mut AgentMemory,
        ctx:       &AgentContext,
        output_tx: OutputTx<'_>,
    ) -> Event {
        emit(output_tx, AgentOutput::StateStarted(State::reasoning()));

        // 1. Guard: iteration budget
        let max_iterations = memory.config.max_iterations;
        if memory.iteration >= max_iterations {
            memory.failure = Some(FailureReason::IterationBudgetExhausted { max_iterations });
            memory.log("Reasoning", "BUDGET_EXHAUSTED", &format!("iterations={}", memory.iteration));
            return Event::budget_exhausted();
        }

        let i = memory.iteration;
        memory.iteration += 1;
        memory.current_step = None;
        memory.log("Reasoning", "ITERATION_START", &format!("iteration={}/{}", i + 1, max_iterations));

        // 2. Oracle call under the oracle retry budget
        let messages = memory.build_messages(&ctx.tools);
        let llm = ctx.llm.as_ref();
        let messages = messages.as_slice();
        let outcome = memory
            .config
            .oracle_retry
            .attempt_notify(
                || async move { Self::call_oracle(llm, messages, output_tx).await },
                |attempt, wait, error| {
                    emit(output_tx, AgentOutput::Retrying {
                        attempt,
                        wait_ms: wait.as_millis() as u64,
                        error:   error.to_string(),
                    });
                },
            )
            .await;

        let response = match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                if attempts > 1 {
                    memory.log("Reasoning", "ORACLE_RECOVERED", &format!("attempts={}", attempts));
                }
                value
            }
            RetryOutcome::Exhausted { last_error, attempts } => {
                memory.log("Reasoning", "ORACLE_EXHAUSTED", &last_error);
                memory.failure = Some(FailureReason::OracleFailure { attempts, last_error });
                return Event::fatal_error();
            }
        };

        if let Some(usage) = response.usage {
            memory.total_usage.add(usage);
        }

        // 3. Parse and record the thought
        let mut step = parser::parse(&response.content);
        if step.action.is_none() && step.final_answer.is_none() {
            // Providers with native tool calling may leave the text bare
            if let Some(call) = response.tool_calls.as_ref().and_then(|calls| calls.first()) {
                step.action = Some(call.name.clone());
                step.action_input = Some(call.args.clone());
            }
        }
        memory.log("Reasoning", "ORACLE_RESPONSE", &response.content.chars().take(100).collect::<String>());
        memory.record(HistoryEvent::Thought(step.thought.clone()));
        emit(output_tx, AgentOutput::Thought(step.thought.clone()));
        memory.current_step = Some(step);

        // 4. Reflection point, otherwise route directly
        if memory.config.reflects_at(i) {
            memory.log("Reasoning", "NEEDS_REFLECTION", &format!("iteration={}", i));
            return Event::needs_reflection();
        }
        route_step("Reasoning", memory, output_tx)
    }
}
