//! # Basic Agent Example
//!
//! A research agent with a single search tool and a sensitive publish tool
//! behind an approval prompt. Uses OpenAI when `OPENAI_API_KEY` is set,
//! otherwise a scripted mock oracle.
//!
//! # Usage
//! ```bash
//! cargo run --example basic_agent
//! RUST_LOG=debug OPENAI_API_KEY=sk-... cargo run --example basic_agent
//! REACTSM_CONFIG=agent.json REACTSM_TRACE=traces/run.json cargo run --example basic_agent
//! ```

use reactsm::{AgentBuilder, AgentConfig, FnTool, LlmCaller, MockLlmCaller};
use std::io::{stdin, stdout, Write};
use std::sync::Arc;
use std::time::Duration;

fn oracle(config: &AgentConfig) -> Arc<dyn LlmCaller> {
    #[cfg(feature = "openai")]
    if std::env::var("OPENAI_API_KEY").is_ok() {
        let model = config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
        return Arc::new(reactsm::OpenAiCaller::new(model));
    }
    let _ = config;
    Arc::new(MockLlmCaller::replies([
        "Thought: I should look this up\nAction: search\nAction Input: {\"query\": \"capital of France population\"}",
        "Thought: I have what I need\nAction: publish\nAction Input: {\"text\": \"Paris, about 2.1 million people\"}",
        "Thought: I can now answer the original question\nFinal Answer: Paris is the capital of France, with about 2.1 million inhabitants.",
    ]))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::var("REACTSM_CONFIG") {
        Ok(path) => AgentConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        Err(_) => AgentConfig::default(),
    };

    println!("=== reactsm-rs Basic Agent Example ===\n");

    let search = FnTool::new("search", "Search the web for current information. Use for any factual queries.")
        .param("query", "string", "The search query to look up")
        .call(|args| {
            let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
            Ok(format!(
                "Search results for '{}': Paris is the capital of France. \
                 The city has a population of approximately 2.1 million people.",
                query
            ))
        });

    let publish = FnTool::new("publish", "Publish a short note to the team channel")
        .param("text", "string", "The note to publish")
        .requires_approval(true)
        .call(|args| Ok(format!("Published: {}", args.get("text").and_then(|v| v.as_str()).unwrap_or(""))));

    let mut engine = AgentBuilder::new("What is the capital of France and what is its population?")
        .system_prompt("You are a helpful research assistant. Use the search tool before answering.")
        .llm(oracle(&config))
        .config(config)
        .tool(search)
        .tool(publish)
        .on_approval(|req| {
            print!("\nAllow '{}' with {:?}? [y/N] ", req.tool_name, req.params);
            let _ = stdout().flush();
            let mut line = String::new();
            stdin().read_line(&mut line).is_ok() && line.trim().eq_ignore_ascii_case("y")
        })
        .approval_timeout(Duration::from_secs(60))
        .build()?;

    match engine.run().await {
        Ok(answer) => {
            println!("\n╔══════════════════════╗");
            println!("║    FINAL ANSWER      ║");
            println!("╚══════════════════════╝");
            println!("{}\n", answer);

            println!("╔══════════════════════╗");
            println!("║       TRACE          ║");
            println!("╚══════════════════════╝");
            engine.trace().print();
            println!("\nHandler activity: {:?}", engine.trace().state_counts());
            println!("Tokens used: {}", engine.memory.total_usage.total_tokens);
            if let Ok(path) = std::env::var("REACTSM_TRACE") {
                engine.trace().save_to(&path)?;
                println!("Trace written to {}", path);
            }
        }
        Err(e) => {
            eprintln!("Agent failed: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
