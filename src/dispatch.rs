use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use crate::human::{ApprovalCallback, ApprovalRequest};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::tools::{Tool, ToolParams, ToolResult};

/// The outcome class behind an observation string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    NotFound,
    PolicyDenied,
    UserDenied,
    Success,
    Failure,
}

/// Why a sensitive call did not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// No approval callback configured.
    NoApprovalMechanism,
    /// The callback did not answer in time.
    ApprovalTimedOut(Duration),
    /// The callback said no.
    UserDenied,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Executed(ToolResult),
    Denied { tool_name: String, reason: DenialReason },
}

impl DispatchOutcome {
    pub fn kind(&self) -> ObservationKind {
        match self {
            DispatchOutcome::Executed(r) if r.success => ObservationKind::Success,
            DispatchOutcome::Executed(_) => ObservationKind::Failure,
            DispatchOutcome::Denied { reason: DenialReason::UserDenied, .. } => ObservationKind::UserDenied,
            DispatchOutcome::Denied { .. } => ObservationKind::PolicyDenied,
        }
    }

    /// The text the oracle sees as `Observation:`.
    pub fn observation(&self) -> String {
        match self {
            DispatchOutcome::Executed(r) if r.success => r.output.clone().unwrap_or_default(),
            DispatchOutcome::Executed(r) => {
                format!("Error: {}", r.error.as_deref().unwrap_or("unknown error"))
            }
            DispatchOutcome::Denied { tool_name, reason } => match reason {
                DenialReason::NoApprovalMechanism => format!(
                    "Execution of tool '{}' denied: no approval mechanism configured.",
                    tool_name
                ),
                DenialReason::ApprovalTimedOut(after) => format!(
                    "Execution of tool '{}' denied: approval timed out after {}ms.",
                    tool_name,
                    after.as_millis()
                ),
                DenialReason::UserDenied => {
                    format!("User denied execution of tool '{}'.", tool_name)
                }
            },
        }
    }
}

/// Observation for an action naming an unregistered tool.
pub fn not_found_observation(tool_name: &str) -> String {
    format!("Error: Tool '{}' not found.", tool_name)
}

/// Runs tools under the tool retry budget, asking for approval first when
/// the tool is sensitive.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    approval:         Option<ApprovalCallback>,
    retry:            RetryPolicy,
    approval_timeout: Option<Duration>,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new(RetryPolicy::tool())
    }
}

impl ToolDispatcher {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { approval: None, retry, approval_timeout: None }
    }

    pub fn with_approval(mut self, callback: Option<ApprovalCallback>) -> Self {
        self.approval = callback;
        self
    }

    pub fn with_approval_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub async fn execute(&self, tool: &dyn Tool, params: &ToolParams) -> DispatchOutcome {
        let name = tool.name().to_string();

        if tool.requires_approval() {
            if let Some(reason) = self.check_approval(&name, params).await {
                tracing::warn!(tool = %name, ?reason, "tool call denied");
                return DispatchOutcome::Denied { tool_name: name, reason };
            }
        }

        let start = Instant::now();
        let outcome = self
            .retry
            .attempt(|| async {
                let result = tool.execute(params).await;
                if result.success {
                    Ok(result)
                } else {
                    Err(result.error.unwrap_or_else(|| "unknown error".to_string()))
                }
            })
            .await;

        let result = match outcome {
            RetryOutcome::Succeeded { value, .. } => value,
            RetryOutcome::Exhausted { last_error, attempts } => {
                tracing::warn!(tool = %name, attempts, error = %last_error, "tool failed");
                ToolResult::failure(&name, last_error, start.elapsed().as_millis() as u64)
            }
        };
        DispatchOutcome::Executed(result)
    }

    /// `None` means approved.
    async fn check_approval(&self, name: &str, params: &ToolParams) -> Option<DenialReason> {
        let Some(callback) = &self.approval else {
            return Some(DenialReason::NoApprovalMechanism);
        };
        let request = ApprovalRequest { tool_name: name.to_string(), params: params.clone() };
        let decision = match self.approval_timeout {
            Some(limit) => match tokio::time::timeout(limit, callback.request(request)).await {
                Ok(decision) => decision,
                Err(_) => return Some(DenialReason::ApprovalTimedOut(limit)),
            },
            None => callback.request(request).await,
        };
        (!decision).then_some(DenialReason::UserDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_tool(sensitive: bool, calls: Arc<AtomicUsize>) -> FnTool {
        FnTool::new("rm", "Remove a file")
            .requires_approval(sensitive)
            .call(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("removed".to_string())
            })
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn sensitive_tool_without_callback_never_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = counting_tool(true, calls.clone());
        let outcome = ToolDispatcher::new(fast()).execute(&tool, &ToolParams::new()).await;

        assert_eq!(outcome.kind(), ObservationKind::PolicyDenied);
        assert!(outcome.observation().contains("no approval mechanism"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn approved_tool_runs_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = counting_tool(true, calls.clone());
        let dispatcher = ToolDispatcher::new(fast())
            .with_approval(Some(ApprovalCallback::from_fn(|_| true)));
        let outcome = dispatcher.execute(&tool, &ToolParams::new()).await;

        assert_eq!(outcome.kind(), ObservationKind::Success);
        assert_eq!(outcome.observation(), "removed");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_uses_user_denied_text() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = counting_tool(true, calls.clone());
        let dispatcher = ToolDispatcher::new(fast())
            .with_approval(Some(ApprovalCallback::from_fn(|_| false)));
        let outcome = dispatcher.execute(&tool, &ToolParams::new()).await;

        assert_eq!(outcome.observation(), "User denied execution of tool 'rm'.");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_approval_times_out_as_policy_denial() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = counting_tool(true, calls.clone());
        let dispatcher = ToolDispatcher::new(fast())
            .with_approval(Some(ApprovalCallback::from_async(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                true
            })))
            .with_approval_timeout(Some(Duration::from_millis(250)));
        let outcome = dispatcher.execute(&tool, &ToolParams::new()).await;

        assert_eq!(outcome.kind(), ObservationKind::PolicyDenied);
        assert_eq!(
            outcome.observation(),
            "Execution of tool 'rm' denied: approval timed out after 250ms."
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blocking_approval_is_cut_off_by_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = counting_tool(true, calls.clone());
        let dispatcher = ToolDispatcher::new(fast())
            .with_approval(Some(ApprovalCallback::from_fn(|_| {
                std::thread::sleep(Duration::from_millis(500));
                true
            })))
            .with_approval_timeout(Some(Duration::from_millis(50)));

        let start = Instant::now();
        let outcome = dispatcher.execute(&tool, &ToolParams::new()).await;

        assert!(start.elapsed() < Duration::from_millis(400), "elapsed {:?}", start.elapsed());
        assert_eq!(outcome.kind(), ObservationKind::PolicyDenied);
        assert_eq!(
            outcome.observation(),
            "Execution of tool 'rm' denied: approval timed out after 50ms."
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_tool_is_retried_then_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let tool = FnTool::new("flaky", "Always fails").call(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("disk full".to_string())
        });
        let outcome = ToolDispatcher::new(fast()).execute(&tool, &ToolParams::new()).await;

        assert_eq!(outcome.kind(), ObservationKind::Failure);
        assert_eq!(outcome.observation(), "Error: disk full");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct CachedTool {
        invoked: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Tool for CachedTool {
        fn name(&self) -> &str {
            "lookup"
        }

        fn description(&self) -> &str {
            "Serves answers from a local cache"
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }

        async fn invoke(&self, _params: &ToolParams) -> Result<String, String> {
            self.invoked.fetch_add(1, Ordering::SeqCst);
            Err("backend offline".to_string())
        }

        async fn execute(&self, _params: &ToolParams) -> ToolResult {
            ToolResult::success("lookup", "cached: 42".to_string(), 7)
        }
    }

    #[tokio::test]
    async fn custom_execute_result_is_reported_as_is() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let tool = CachedTool { invoked: invoked.clone() };
        let outcome = ToolDispatcher::new(fast()).execute(&tool, &ToolParams::new()).await;

        assert_eq!(outcome, DispatchOutcome::Executed(ToolResult::success("lookup", "cached: 42".to_string(), 7)));
        assert_eq!(outcome.observation(), "cached: 42");
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn flaky_tool_succeeds_on_second_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let tool = FnTool::new("flaky", "Fails once").call(move |_| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err("timeout".to_string()),
                _ => Ok("fine".to_string()),
            }
        });
        let outcome = ToolDispatcher::new(fast()).execute(&tool, &ToolParams::new()).await;

        assert_eq!(outcome.kind(), ObservationKind::Success);
        assert_eq!(outcome.observation(), "fine");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn not_found_text() {
        assert_eq!(not_found_observation("web"), "Error: Tool 'web' not found.");
    }
}
