//! Approval gate behaviour for sensitive tools, end to end through the loop.

use reactsm::{AgentBuilder, AgentEngine, FnTool, HistoryEvent, MockLlmCaller, RetryPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DELETE_STEP: &str = "Thought: the user asked me to wipe it\nAction: delete_database\nAction Input: {\"name\": \"prod\"}";

fn delete_database(invocations: Arc<AtomicUsize>) -> FnTool {
    FnTool::new("delete_database", "Deletes all data")
        .param("name", "string", "database name")
        .requires_approval(true)
        .call(move |_| {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok("Database deleted".to_string())
        })
}

/// Asks for the deletion once, then answers with whatever it observed.
fn oracle() -> Arc<MockLlmCaller> {
    Arc::new(MockLlmCaller::from_fn(|prompt| {
        let history = prompt.split("Current History:").nth(1).unwrap_or_default();
        match history.split("Observation: ").nth(1) {
            Some(tail) => {
                let observed = tail.lines().next().unwrap_or_default();
                Ok(format!("Thought: done\nFinal Answer: {}", observed))
            }
            None => Ok(DELETE_STEP.to_string()),
        }
    }))
}

fn observation(engine: &AgentEngine) -> String {
    engine
        .run_state()
        .history()
        .iter()
        .find_map(|e| match &e.event {
            HistoryEvent::Observation(o) => Some(o.clone()),
            _ => None,
        })
        .expect("one observation")
}

#[tokio::test]
async fn test_rejected_call_never_runs() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let asked = Arc::new(Mutex::new(Vec::new()));
    let asked_in_cb = asked.clone();

    let mut agent = AgentBuilder::new("Delete the prod database")
        .llm(oracle())
        .tool(delete_database(invocations.clone()))
        .on_approval(move |req| {
            asked_in_cb.lock().unwrap().push(req);
            false
        })
        .build()
        .unwrap();

    let answer = agent.run().await.unwrap();

    assert_eq!(observation(&agent), "User denied execution of tool 'delete_database'.");
    assert_eq!(answer, "User denied execution of tool 'delete_database'.");
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    let asked = asked.lock().unwrap();
    assert_eq!(asked.len(), 1);
    assert_eq!(asked[0].tool_name, "delete_database");
    assert_eq!(asked[0].params["name"], "prod");
}

#[tokio::test]
async fn test_sensitive_tool_without_callback_is_denied() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let mut agent = AgentBuilder::new("Delete the prod database")
        .llm(oracle())
        .tool(delete_database(invocations.clone()))
        .build()
        .unwrap();

    agent.run().await.unwrap();

    assert!(observation(&agent).contains("no approval mechanism"));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_approved_call_runs_exactly_once() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let mut agent = AgentBuilder::new("Delete the prod database")
        .llm(oracle())
        .tool(delete_database(invocations.clone()))
        .on_approval_async(|_| async { true })
        .tool_retry(RetryPolicy::new(3, Duration::from_millis(1)))
        .build()
        .unwrap();

    assert_eq!(agent.run().await.unwrap(), "Database deleted");
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_approval_times_out() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let mut agent = AgentBuilder::new("Delete the prod database")
        .llm(oracle())
        .tool(delete_database(invocations.clone()))
        .on_approval_async(|_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            true
        })
        .approval_timeout(Duration::from_millis(250))
        .build()
        .unwrap();

    agent.run().await.unwrap();

    assert_eq!(
        observation(&agent),
        "Execution of tool 'delete_database' denied: approval timed out after 250ms."
    );
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_sensitive_tool_skips_the_gate() {
    let asked = Arc::new(AtomicUsize::new(0));
    let asked_in_cb = asked.clone();
    let oracle = Arc::new(MockLlmCaller::replies([
        "Thought: read\nAction: read_file\nAction Input: {}",
        "Final Answer: read it",
    ]));
    let mut agent = AgentBuilder::new("Read the file")
        .llm(oracle)
        .tool(FnTool::new("read_file", "Reads a file").call(|_| Ok("contents".to_string())))
        .on_approval(move |_| {
            asked_in_cb.fetch_add(1, Ordering::SeqCst);
            false
        })
        .build()
        .unwrap();

    agent.run().await.unwrap();

    assert_eq!(observation(&agent), "contents");
    assert_eq!(asked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_blocking_approval_respects_timeout() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let mut agent = AgentBuilder::new("Delete the prod database")
        .llm(oracle())
        .tool(delete_database(invocations.clone()))
        .on_approval(|_| {
            std::thread::sleep(Duration::from_millis(500));
            true
        })
        .approval_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let start = std::time::Instant::now();
    agent.run().await.unwrap();

    assert!(start.elapsed() < Duration::from_millis(400), "elapsed {:?}", start.elapsed());
    assert_eq!(
        observation(&agent),
        "Execution of tool 'delete_database' denied: approval timed out after 50ms."
    );
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}
