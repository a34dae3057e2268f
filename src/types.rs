use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use crate::dispatch::ObservationKind;
use crate::error::AgentError;
use crate::planner::Plan;
use crate::reflector::Critique;
use crate::retry::RetryPolicy;

/// A named state in the agent's state machine.
///
/// States are identified by their string name. The library ships with
/// constants for the ReAct cycle (`State::reasoning()`, …) but custom
/// handlers may introduce their own.
///
/// ```
/// use reactsm::State;
/// let verifying = State::new("Verifying");
/// assert_eq!(verifying.as_str(), "Verifying");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State(pub String);

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for `"Done"` and `"Error"`.
    pub fn is_terminal(&self) -> bool {
        self.0 == "Done" || self.0 == "Error"
    }

    // ── Well-known built-in state constructors ──────────────────────────
    pub fn idle()       -> Self { Self::new("Idle") }
    pub fn planning()   -> Self { Self::new("Planning") }
    pub fn reasoning()  -> Self { Self::new("Reasoning") }
    pub fn reflecting() -> Self { Self::new("Reflecting") }
    pub fn replanning() -> Self { Self::new("Replanning") }
    pub fn acting()     -> Self { Self::new("Acting") }
    pub fn observing()  -> Self { Self::new("Observing") }
    pub fn done()       -> Self { Self::new("Done") }
    pub fn error()      -> Self { Self::new("Error") }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A native tool invocation reported by a provider that supports tool calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: HashMap<String, serde_json::Value>,
    pub id:   Option<String>,
}

/// Events emitted while the agent runs. Delivery is best-effort: a dropped
/// receiver never affects the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentOutput {
    StateStarted(State),
    /// A streamed fragment of oracle text
    LlmToken(String),
    Thought(String),
    ToolCallStarted {
        name: String,
        args: HashMap<String, serde_json::Value>,
    },
    ToolCallFinished {
        name:        String,
        observation: String,
        kind:        ObservationKind,
    },
    Reflection(Critique),
    PlanUpdated(Plan),
    Retrying {
        attempt: u32,
        wait_ms: u64,
        error:   String,
    },
    /// A generic progress message
    Action(String),
    FinalAnswer(String),
    Error(String),
}

/// Run configuration.
///
/// ```
/// # use reactsm::AgentConfig;
/// let config = AgentConfig::from_json_str(r#"{ "max_iterations": 4, "adaptive_planning": true }"#).unwrap();
/// assert_eq!(config.max_iterations, 4);
/// assert_eq!(config.reflect_every, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard cap on reason→act iterations per run
    pub max_iterations: usize,

    /// Create a plan up front and replan when reflection reports a stall
    pub adaptive_planning: bool,

    /// Reflect at iterations `i > 0` with `i % reflect_every == 0` (0 = never)
    pub reflect_every: usize,

    /// Number of most recent history events shown to the reflector
    pub reflection_window: usize,

    pub oracle_retry: RetryPolicy,

    pub tool_retry: RetryPolicy,

    /// Deny sensitive calls whose approval takes longer than this
    pub approval_timeout_ms: Option<u64>,

    /// Keep only the last N characters of the scratch transcript
    pub max_scratch_chars: Option<usize>,

    /// Model name for providers that take one per request
    pub model: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations:      10,
            adaptive_planning:   false,
            reflect_every:       3,
            reflection_window:   5,
            oracle_retry:        RetryPolicy::oracle(),
            tool_retry:          RetryPolicy::tool(),
            approval_timeout_ms: None,
            max_scratch_chars:   None,
            model:               None,
        }
    }
}

impl AgentConfig {
    /// Parse a (possibly partial) JSON config; missing fields keep defaults.
    pub fn from_json_str(json: &str) -> Result<Self, AgentError> {
        serde_json::from_str(json).map_err(|e| AgentError::ConfigError(e.to_string()))
    }

    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_ms.map(Duration::from_millis)
    }

    /// Whether iteration `i` (0-indexed) is a reflection point.
    pub fn reflects_at(&self, i: usize) -> bool {
        self.reflect_every > 0 && i > 0 && i % self.reflect_every == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflection_points_follow_cadence() {
        let config = AgentConfig::default();
        let points: Vec<usize> = (0..10).filter(|i| config.reflects_at(*i)).collect();
        assert_eq!(points, vec![3, 6, 9]);
    }

    #[test]
    fn zero_cadence_disables_reflection() {
        let config = AgentConfig { reflect_every: 0, ..Default::default() };
        assert!((0..20).all(|i| !config.reflects_at(i)));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AgentConfig::from_json_str(
            r#"{ "tool_retry": { "max_attempts": 5, "base_delay_ms": 10, "max_delay_ms": null } }"#,
        )
        .expect("valid config");
        assert_eq!(config.tool_retry.max_attempts, 5);
        assert_eq!(config.oracle_retry, RetryPolicy::oracle());
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn bad_json_is_config_error() {
        let err = AgentConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }
}
