//! # Streaming Agent Example
//!
//! Prints oracle tokens, tool calls, reflections and plan updates as they
//! happen. Uses OpenAI when `OPENAI_API_KEY` is set, otherwise a mock.
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example streaming_agent
//! ```

use futures::StreamExt;
use reactsm::{AgentBuilder, AgentOutput, FnTool, LlmCaller, MockLlmCaller};
use std::io::{stdout, Write};
use std::sync::Arc;

fn oracle() -> Arc<dyn LlmCaller> {
    #[cfg(feature = "openai")]
    if std::env::var("OPENAI_API_KEY").is_ok() {
        return Arc::new(reactsm::OpenAiCaller::new("gpt-4o"));
    }
    Arc::new(MockLlmCaller::from_fn(|prompt| {
        if prompt.contains("Decompose the following task") {
            Ok(r#"{"steps": [{"id": 1, "description": "add the numbers", "tool": "calculator"}]}"#.to_string())
        } else if prompt.contains("Observation: 579") {
            Ok("Thought: I can now answer the original question\nFinal Answer: 123 + 456 = 579".to_string())
        } else {
            Ok("Thought: I should use the calculator\nAction: calculator\nAction Input: {\"a\": 123, \"b\": 456}".to_string())
        }
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut agent = AgentBuilder::new("Use the 'calculator' tool to add 123 and 456.")
        .llm(oracle())
        .adaptive_planning(true)
        .tool(
            FnTool::new("calculator", "Adds two numbers")
                .param("a", "number", "First number")
                .param("b", "number", "Second number")
                .call(|args| {
                    let a = args.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
                    let b = args.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
                    Ok((a + b).to_string())
                }),
        )
        .build()?;

    println!("\n--- Streaming Output ---\n");
    let mut stream = agent.run_streaming();

    while let Some(output) = stream.next().await {
        match output {
            AgentOutput::StateStarted(state) => println!("\n\n[STATE] Entering: {}", state),
            AgentOutput::LlmToken(token) => {
                print!("{}", token);
                stdout().flush()?;
            }
            AgentOutput::Thought(_) => {}
            AgentOutput::ToolCallStarted { name, args } => {
                println!("\n[TOOL CALL] {} with arguments: {:?}", name, args);
            }
            AgentOutput::ToolCallFinished { name, observation, kind } => {
                println!("[TOOL RESULT] {} ({:?}): {}", name, kind, observation);
            }
            AgentOutput::Reflection(c) => {
                println!("\n[REFLECTION] progressing={} {}", c.is_progressing, c.critique);
            }
            AgentOutput::PlanUpdated(plan) => println!("\n[PLAN]\n{}", plan.numbered()),
            AgentOutput::Retrying { attempt, wait_ms, error } => {
                println!("\n[RETRY] attempt {} in {}ms: {}", attempt, wait_ms, error);
            }
            AgentOutput::Action(msg) => println!("\n[ACTION] {}", msg),
            AgentOutput::FinalAnswer(answer) => println!("\n\n[FINAL ANSWER]\n{}", answer),
            AgentOutput::Error(err) => eprintln!("\n[ERROR] {}", err),
        }
    }
    drop(stream);

    println!("\n--- Streaming Complete ({} steps recorded) ---\n", agent.run_state().history().len());
    Ok(())
}
